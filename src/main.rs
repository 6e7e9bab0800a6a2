//! Cloudsmith reconcile CLI entrypoint.
//!
//! This is the main entrypoint for the cloudsmith-reconcile command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cloudsmith_reconcile::api::CloudsmithClient;
use cloudsmith_reconcile::cli::{
    Cli, Commands, ListCommands, OutputFormatter, ResourceReport, load_desired,
};
use cloudsmith_reconcile::config::{ConfigParser, ConfigValidator, ProviderConfig, find_config_file};
use cloudsmith_reconcile::datasource::{EntitlementQuery, PackageQuery, RegistryObserver};
use cloudsmith_reconcile::error::Result;
use cloudsmith_reconcile::reconcile::Timeouts;
use cloudsmith_reconcile::resources::ResourceKind;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = load_config(cli.config.as_deref())?;
    let client = CloudsmithClient::from_config(&config)?;
    let timeouts = config.waits.timeouts();

    match cli.command {
        Commands::Check => cmd_check(&client, &formatter).await,
        Commands::Create { kind, scope, file } => {
            cmd_create(&client, timeouts, kind, &scope, &file, &formatter).await
        }
        Commands::Read { kind, key } | Commands::Import { kind, key } => {
            cmd_import(&client, timeouts, kind, &key, &formatter).await
        }
        Commands::Update { kind, key, file } => {
            cmd_update(&client, timeouts, kind, &key, &file, &formatter).await
        }
        Commands::Delete { kind, key } => cmd_delete(&client, timeouts, kind, &key, &formatter).await,
        Commands::List { command } => cmd_list(&client, command, &formatter).await,
        Commands::Namespace { slug } => {
            let namespace = RegistryObserver::new(&client).namespace(&slug).await?;
            emit(&formatter.format_namespace(&namespace))
        }
    }
}

/// Check the API key.
async fn cmd_check(client: &CloudsmithClient, formatter: &OutputFormatter) -> Result<()> {
    let user = client.whoami().await?;
    emit(&formatter.format_check(&user))
}

/// Create a resource from a desired-state file.
async fn cmd_create(
    client: &CloudsmithClient,
    timeouts: Timeouts,
    kind: ResourceKind,
    scope: &str,
    file: &Path,
    formatter: &OutputFormatter,
) -> Result<()> {
    let desired = load_desired(file)?;
    let mut resource = kind.open(client, timeouts, scope)?;

    info!("Creating {kind} in {scope}");
    resource.create(desired).await?;

    emit(&formatter.format_resource(&ResourceReport::capture(resource.as_ref())?))
}

/// Import (and read) a resource by key.
async fn cmd_import(
    client: &CloudsmithClient,
    timeouts: Timeouts,
    kind: ResourceKind,
    key: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let resource = kind.import(client, timeouts, key).await?;
    emit(&formatter.format_resource(&ResourceReport::capture(resource.as_ref())?))
}

/// Update a resource from a desired-state file.
async fn cmd_update(
    client: &CloudsmithClient,
    timeouts: Timeouts,
    kind: ResourceKind,
    key: &str,
    file: &Path,
    formatter: &OutputFormatter,
) -> Result<()> {
    let desired = load_desired(file)?;
    let mut resource = kind.import(client, timeouts, key).await?;

    info!("Updating {kind} {key}");
    resource.update(desired).await?;

    emit(&formatter.format_resource(&ResourceReport::capture(resource.as_ref())?))
}

/// Delete a resource by key.
async fn cmd_delete(
    client: &CloudsmithClient,
    timeouts: Timeouts,
    kind: ResourceKind,
    key: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut resource = kind.import(client, timeouts, key).await?;

    info!("Deleting {kind} {key}");
    resource.delete().await?;

    emit(&formatter.format_deleted(kind.name(), key))
}

/// Listing commands.
async fn cmd_list(
    client: &CloudsmithClient,
    command: ListCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let observer = RegistryObserver::new(client);

    let output = match command {
        ListCommands::Packages {
            namespace,
            repository,
            query,
            sort,
            most_recent,
            page_size,
            page_count,
        } => {
            let query = PackageQuery {
                query,
                sort,
                most_recent,
                page_size,
                page_count,
            };
            let packages = observer.packages(&namespace, &repository, &query).await?;
            formatter.format_packages(&packages)
        }
        ListCommands::Members {
            organization,
            active,
        } => {
            let members = observer.org_members(&organization, active).await?;
            formatter.format_members(&members)
        }
        ListCommands::Entitlements {
            namespace,
            repository,
            query,
            active,
            show_tokens,
        } => {
            let query = EntitlementQuery {
                query,
                active,
                show_tokens,
            };
            let tokens = observer
                .entitlement_tokens(&namespace, &repository, &query)
                .await?;
            formatter.format_entitlements(&tokens)
        }
    };

    emit(&output)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads, overrides and validates the provider configuration.
fn load_config(config_path: Option<&Path>) -> Result<ProviderConfig> {
    let config_file: Option<PathBuf> = config_path
        .map(Path::to_path_buf)
        .or_else(|| find_config_file("."));

    let base = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    if let Some(path) = &config_file {
        debug!("Loading configuration from: {}", path.display());
    }
    let config = parser.load_with_env(config_file.as_deref())?;

    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok(config)
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
