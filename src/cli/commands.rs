//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::resources::ResourceKind;

/// Cloudsmith reconcile - drive Cloudsmith resources through their lifecycle.
#[derive(Parser, Debug)]
#[command(name = "cloudsmith-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CLOUDSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the API key authenticates.
    Check,

    /// Create a resource and wait until it is visible.
    Create {
        /// Resource kind.
        kind: ResourceKind,

        /// Scope key, such as `acme` or `acme.my-repo`.
        scope: String,

        /// YAML or JSON file with the desired state.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Read a resource by its import key.
    Read {
        /// Resource kind.
        kind: ResourceKind,

        /// Import key, such as `acme.my-repo.XYZ123`.
        key: String,
    },

    /// Import an existing resource and report its identity.
    Import {
        /// Resource kind.
        kind: ResourceKind,

        /// Import key, such as `acme.my-repo.XYZ123`.
        key: String,
    },

    /// Update a resource and wait until the change is visible.
    Update {
        /// Resource kind.
        kind: ResourceKind,

        /// Import key of the resource to update.
        key: String,

        /// YAML or JSON file with the desired state.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete a resource and wait until it is gone.
    Delete {
        /// Resource kind.
        kind: ResourceKind,

        /// Import key of the resource to delete.
        key: String,
    },

    /// List registry objects.
    List {
        /// What to list.
        #[command(subcommand)]
        command: ListCommands,
    },

    /// Look up a namespace.
    Namespace {
        /// Namespace slug.
        slug: String,
    },
}

/// Listing subcommands.
#[derive(Subcommand, Debug)]
pub enum ListCommands {
    /// Packages in a repository.
    Packages {
        /// Owning namespace.
        namespace: String,

        /// Repository slug.
        repository: String,

        /// Search query.
        #[arg(short, long)]
        query: Option<String>,

        /// Sort expression, such as `-date`.
        #[arg(long)]
        sort: Option<String>,

        /// Only the most recent match.
        #[arg(long)]
        most_recent: bool,

        /// Items per page.
        #[arg(long, default_value = "0")]
        page_size: i64,

        /// Pages to fetch (0 for all).
        #[arg(long, default_value = "0")]
        page_count: i64,
    },

    /// Organization members.
    Members {
        /// Organization slug.
        organization: String,

        /// Filter on active membership.
        #[arg(long)]
        active: Option<bool>,
    },

    /// Entitlement tokens of a repository.
    Entitlements {
        /// Owning namespace.
        namespace: String,

        /// Repository slug.
        repository: String,

        /// Search query.
        #[arg(short, long)]
        query: Option<String>,

        /// Filter on active tokens.
        #[arg(long)]
        active: Option<bool>,

        /// Include token secrets.
        #[arg(long)]
        show_tokens: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "cloudsmith-reconcile",
            "--output",
            "json",
            "create",
            "vulnerability_policy",
            "acme",
            "--file",
            "policy.yaml",
        ])
        .unwrap();

        assert!(matches!(cli.output, OutputFormat::Json));
        match cli.command {
            Commands::Create { kind, scope, file } => {
                assert_eq!(kind, ResourceKind::VulnerabilityPolicy);
                assert_eq!(scope, "acme");
                assert_eq!(file, PathBuf::from("policy.yaml"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_most_recent_listing() {
        let cli = Cli::try_parse_from([
            "cloudsmith-reconcile",
            "list",
            "packages",
            "acme",
            "web",
            "--query",
            "name:app",
            "--most-recent",
        ])
        .unwrap();

        match cli.command {
            Commands::List {
                command:
                    ListCommands::Packages {
                        query, most_recent, ..
                    },
            } => {
                assert_eq!(query.as_deref(), Some("name:app"));
                assert!(most_recent);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = Cli::try_parse_from(["cloudsmith-reconcile", "read", "pod", "acme.x"]);
        assert!(result.is_err());
    }
}
