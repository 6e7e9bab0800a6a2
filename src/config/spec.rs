//! Provider configuration types.
//!
//! These structs map to `cloudsmith.yaml`. Every field has a default so an
//! absent file still yields a usable configuration once the API key is
//! supplied through the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reconcile::{Timeouts, WaitPolicy};

/// Default Cloudsmith API endpoint.
pub const DEFAULT_API_HOST: &str = "https://api.cloudsmith.io/v1";

/// The root provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the API, without a trailing slash.
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// API key. Usually supplied via `CLOUDSMITH_API_KEY` instead.
    #[serde(default)]
    pub api_key: Option<String>,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Convergence wait settings.
    #[serde(default)]
    pub waits: WaitConfig,
}

/// Convergence wait settings per operation class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitConfig {
    /// Wait after create until the resource is visible.
    #[serde(default = "default_create_wait")]
    pub create: WaitWindow,
    /// Wait after update until the change is visible.
    #[serde(default = "default_update_wait")]
    pub update: WaitWindow,
    /// Wait after delete until the resource is gone.
    #[serde(default = "default_delete_wait")]
    pub delete: WaitWindow,
    /// Fixed delay used by resources with no convergence signal.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

/// A timeout/interval pair in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitWindow {
    /// Total time to wait.
    pub timeout_secs: u64,
    /// Time between checks.
    pub interval_secs: u64,
}

fn default_api_host() -> String {
    String::from(DEFAULT_API_HOST)
}

fn default_user_agent() -> String {
    format!("cloudsmith-reconcile/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_create_wait() -> WaitWindow {
    WaitWindow {
        timeout_secs: 60,
        interval_secs: 2,
    }
}

const fn default_update_wait() -> WaitWindow {
    WaitWindow {
        timeout_secs: 120,
        interval_secs: 3,
    }
}

const fn default_delete_wait() -> WaitWindow {
    WaitWindow {
        timeout_secs: 180,
        interval_secs: 5,
    }
}

const fn default_settle_delay() -> u64 {
    5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_key: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            waits: WaitConfig::default(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            create: default_create_wait(),
            update: default_update_wait(),
            delete: default_delete_wait(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

impl WaitWindow {
    /// Converts the window into a waiter policy.
    #[must_use]
    pub const fn policy(self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.interval_secs),
        )
    }
}

impl WaitConfig {
    /// Builds the per-operation timeouts used by lifecycles.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        Timeouts {
            create: self.create.policy(),
            update: self.update.policy(),
            delete: self.delete.policy(),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
        }
    }
}

impl ProviderConfig {
    /// Returns the API host without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api_host.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_distinguish_operation_classes() {
        let timeouts = WaitConfig::default().timeouts();

        assert!(timeouts.update.timeout > timeouts.create.timeout);
        assert!(timeouts.delete.timeout > timeouts.create.timeout);
        assert_ne!(timeouts.create.interval, timeouts.delete.interval);
        assert_eq!(timeouts.settle_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let config = ProviderConfig {
            api_host: String::from("https://api.example.com/v1/"),
            ..ProviderConfig::default()
        };
        assert_eq!(config.base_url(), "https://api.example.com/v1");
    }
}
