//! Configuration validation for provider settings.
//!
//! Catches values that would make every API call or every wait fail
//! before any request is sent.

use crate::error::{CloudsmithError, ConfigError, Result};
use tracing::debug;

use super::spec::{ProviderConfig, WaitWindow};

/// Validator for provider configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Whether a missing API key is an error.
    require_api_key: bool,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator that requires an API key.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            require_api_key: true,
        }
    }

    /// Sets whether a missing API key is reported.
    #[must_use]
    pub const fn with_api_key_required(mut self, required: bool) -> Self {
        self.require_api_key = required;
        self
    }

    /// Validates a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_endpoint(config, &mut result);
        self.validate_credentials(config, &mut result);
        Self::validate_waits(config, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(CloudsmithError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    fn validate_endpoint(config: &ProviderConfig, result: &mut ValidationResult) {
        let host = config.api_host.trim();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            result.errors.push(ValidationError {
                field: String::from("api_host"),
                message: format!("API host '{host}' must be an http(s) URL"),
            });
        } else if host.starts_with("http://") {
            result
                .warnings
                .push(format!("API host '{host}' is not using TLS"));
        }

        if config.request_timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("request_timeout_secs"),
                message: String::from("Request timeout must be greater than zero"),
            });
        }

        if config.user_agent.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("user_agent"),
                message: String::from("User agent cannot be empty"),
            });
        }
    }

    fn validate_credentials(&self, config: &ProviderConfig, result: &mut ValidationResult) {
        let missing = config
            .api_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty());

        if missing && self.require_api_key {
            result.errors.push(ValidationError {
                field: String::from("api_key"),
                message: String::from("API key is not set (use CLOUDSMITH_API_KEY)"),
            });
        }
    }

    fn validate_waits(config: &ProviderConfig, result: &mut ValidationResult) {
        let windows = [
            ("waits.create", config.waits.create),
            ("waits.update", config.waits.update),
            ("waits.delete", config.waits.delete),
        ];

        for (field, window) in windows {
            Self::validate_window(field, window, result);
        }
    }

    fn validate_window(field: &str, window: WaitWindow, result: &mut ValidationResult) {
        if window.timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: format!("{field}.timeout_secs"),
                message: String::from("Timeout must be greater than zero"),
            });
        }

        if window.interval_secs == 0 {
            result.errors.push(ValidationError {
                field: format!("{field}.interval_secs"),
                message: String::from("Interval must be greater than zero"),
            });
        } else if window.interval_secs > window.timeout_secs {
            // Allowed: the waiter then checks exactly once.
            result.warnings.push(format!(
                "{field}: interval ({}s) exceeds timeout ({}s); no retries will happen",
                window.interval_secs, window.timeout_secs
            ));
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
