//! Configuration parser for loading provider settings.
//!
//! Settings come from an optional YAML file, then environment variables
//! (optionally seeded from a `.env` file) override individual fields.

use crate::error::{CloudsmithError, ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ProviderConfig;

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "CLOUDSMITH_API_KEY";

/// Environment variable overriding the API host.
pub const ENV_API_HOST: &str = "CLOUDSMITH_API_HOST";

/// Environment variable overriding the user agent.
pub const ENV_USER_AGENT: &str = "CLOUDSMITH_USER_AGENT";

/// Configuration parser for loading provider configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(CloudsmithError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CloudsmithError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML configuration");

        // An empty document deserializes to unit, not to a struct.
        if content.trim().is_empty() {
            return Ok(ProviderConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            CloudsmithError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })
    }

    /// Loads configuration from an optional file and applies environment overrides.
    ///
    /// Without a file the defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if a given file cannot be read or parsed.
    pub fn load_with_env(&self, path: Option<&Path>) -> Result<ProviderConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => {
                debug!("No configuration file, using defaults");
                ProviderConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut ProviderConfig) {
        if let Ok(host) = std::env::var(ENV_API_HOST) {
            debug!("Overriding api_host from environment");
            config.api_host = host;
        }

        if let Ok(key) = std::env::var(ENV_API_KEY) {
            debug!("Overriding api_key from environment");
            config.api_key = Some(key);
        }

        if let Ok(agent) = std::env::var(ENV_USER_AGENT) {
            debug!("Overriding user_agent from environment");
            config.user_agent = agent;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                CloudsmithError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Returns the configured API key.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the file nor the environment set a key.
    pub fn api_key(config: &ProviderConfig) -> Result<String> {
        config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CloudsmithError::Config(ConfigError::MissingEnvVar {
                    name: String::from(ENV_API_KEY),
                })
            })
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cloudsmith.yaml", "cloudsmith.yml"];

/// Finds the configuration file in the start directory, its parents, or the
/// user configuration directory.
///
/// Returns `None` when no file exists; the caller falls back to defaults.
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    let user_dir = dirs::config_dir()?.join("cloudsmith");
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|filename| user_dir.join(filename))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
api_host: https://api.example.com/v1
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.api_host, "https://api.example.com/v1");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.waits.create.timeout_secs, 60);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
api_host: https://api.cloudsmith.io/v1
user_agent: my-orchestrator/2.1
request_timeout_secs: 10
waits:
  create:
    timeout_secs: 30
    interval_secs: 1
  update:
    timeout_secs: 90
    interval_secs: 3
  delete:
    timeout_secs: 120
    interval_secs: 4
  settle_delay_secs: 2
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.user_agent, "my-orchestrator/2.1");
        let timeouts = config.waits.timeouts();
        assert_eq!(timeouts.create.timeout, Duration::from_secs(30));
        assert_eq!(timeouts.delete.interval, Duration::from_secs(4));
        assert_eq!(timeouts.settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ConfigParser::new().parse_yaml("  \n", None).unwrap();
        assert_eq!(config, ProviderConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let result = ConfigParser::new().parse_yaml("waits: [1, 2", None);
        assert!(matches!(
            result,
            Err(CloudsmithError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_load_file_and_discover() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("infra").join("prod");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join("cloudsmith.yaml"),
            "request_timeout_secs: 12\n",
        )
        .unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("cloudsmith.yaml"));

        let config = ConfigParser::new().load_file(&found).unwrap();
        assert_eq!(config.request_timeout_secs, 12);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ConfigParser::new().load_file(dir.path().join("nope.yaml"));
        assert!(matches!(
            result,
            Err(CloudsmithError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_api_key_required() {
        let config = ProviderConfig {
            api_key: Some(String::from("  ")),
            ..ProviderConfig::default()
        };
        assert!(ConfigParser::api_key(&config).is_err());

        let config = ProviderConfig {
            api_key: Some(String::from("secret")),
            ..ProviderConfig::default()
        };
        assert_eq!(ConfigParser::api_key(&config).unwrap(), "secret");
    }
}
