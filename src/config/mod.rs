//! Configuration module for the reconciliation core.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `cloudsmith.yaml` and environment overrides
//! - Validation of endpoint, credentials and wait windows
//! - Turning wait windows into waiter policies

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, ENV_API_HOST, ENV_API_KEY, ENV_USER_AGENT, find_config_file};
pub use spec::{DEFAULT_API_HOST, ProviderConfig, WaitConfig, WaitWindow};
pub use validator::{ConfigValidator, ValidationResult};
