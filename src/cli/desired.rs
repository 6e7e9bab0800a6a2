//! Desired-state documents read from disk.

use serde_json::Value;
use std::path::Path;

use crate::error::{CloudsmithError, ConfigError, Result};

/// Loads a desired-state document from a YAML or JSON file.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, not valid YAML, or
/// not a mapping at the top level.
pub fn load_desired(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(CloudsmithError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    let content = std::fs::read_to_string(path)?;
    let document: Value = serde_yaml::from_str(&content).map_err(|e| {
        CloudsmithError::Config(ConfigError::ParseError {
            message: e.to_string(),
            location: Some(path.display().to_string()),
        })
    })?;

    if !document.is_object() {
        return Err(CloudsmithError::Config(ConfigError::ParseError {
            message: String::from("Desired state must be a mapping"),
            location: Some(path.display().to_string()),
        }));
    }

    Ok(document)
}
