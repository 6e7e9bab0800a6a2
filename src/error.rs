//! Error types for the Cloudsmith reconciliation core.
//!
//! The hierarchy mirrors the stages a lifecycle call passes through:
//! configuration, the HTTP boundary, and reconciliation itself (waiting,
//! import key parsing, operation failures).

use std::path::PathBuf;
use thiserror::Error;

use crate::reconcile::Operation;

/// The main error type for the reconciliation core.
#[derive(Debug, Error)]
pub enum CloudsmithError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cloudsmith API errors.
    #[error("Cloudsmith API error: {0}")]
    Api(#[from] ApiError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Errors raised at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed (401/403).
    #[error("Cloudsmith authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The addressed object does not exist (404).
    #[error("Not found: {path}")]
    NotFound {
        /// Request path that returned 404.
        path: String,
    },

    /// The API rejected the request body (422).
    #[error("Request rejected as invalid: {message}")]
    Unprocessable {
        /// Detail and field errors reported by the API.
        message: String,
    },

    /// Rate limited (429).
    #[error("Cloudsmith API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Any other non-2xx status.
    #[error("Cloudsmith API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Network or TLS failure before a response was received.
    #[error("Network error communicating with Cloudsmith: {message}")]
    Transport {
        /// Description of the network error.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response from Cloudsmith API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The pagination total header was missing or not a base-10 integer.
    #[error("Malformed {header} header: {}", .value.as_deref().unwrap_or("<missing>"))]
    MalformedPaginationHeader {
        /// Header name.
        header: &'static str,
        /// Raw header value, if present.
        value: Option<String>,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The waiter's deadline passed before the check converged.
    #[error("Timed out after {waited_secs}s waiting for {operation} of {resource} to converge")]
    Timeout {
        /// Resource kind and identifier.
        resource: String,
        /// Operation being waited on.
        operation: Operation,
        /// Seconds elapsed when the wait gave up.
        waited_secs: u64,
    },

    /// An API call inside a lifecycle operation failed.
    #[error(
        "Failed to {operation} {kind} '{target}': {source}{}",
        .hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default()
    )]
    OperationFailed {
        /// Resource kind.
        kind: &'static str,
        /// Identity or scope of the resource.
        target: String,
        /// Operation that failed.
        operation: Operation,
        /// Underlying API error.
        source: ApiError,
        /// User-actionable hint, when one is known.
        hint: Option<String>,
    },

    /// An import key did not split into the expected parts.
    #[error("Invalid {kind} import ID '{key}': expected {expected} parts in the format {format}, got {found}")]
    InvalidImportId {
        /// Resource kind.
        kind: &'static str,
        /// The key as supplied.
        key: String,
        /// Required number of parts.
        expected: usize,
        /// Number of parts found.
        found: usize,
        /// Human-readable key format.
        format: &'static str,
    },

    /// Create was called on a lifecycle that already tracks an identity.
    #[error("{kind} '{identity}' is already managed; refusing to create it again")]
    AlreadyManaged {
        /// Resource kind.
        kind: &'static str,
        /// Tracked identity.
        identity: String,
    },

    /// Read/update/delete was called without an identity.
    #[error("{kind} in '{scope}' has no identity; create or import it first")]
    NotManaged {
        /// Resource kind.
        kind: &'static str,
        /// Scope of the resource.
        scope: String,
    },

    /// Desired state could not be turned into a request.
    #[error("Invalid desired state for {kind}: {message}")]
    InvalidDesiredState {
        /// Resource kind.
        kind: &'static str,
        /// What is wrong.
        message: String,
    },
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, CloudsmithError>;

impl CloudsmithError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error reports an HTTP 404.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }

    /// Returns true if the waiter gave up on this operation.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Reconcile(ReconcileError::Timeout { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ApiError {
    /// Creates a request-failed error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_failed_includes_hint() {
        let err = ReconcileError::OperationFailed {
            kind: "oidc",
            target: "acme".to_string(),
            operation: Operation::Create,
            source: ApiError::Unprocessable {
                message: "service_accounts: invalid".to_string(),
            },
            hint: Some("create the service accounts first".to_string()),
        };

        let message = err.to_string();
        assert!(message.starts_with("Failed to create oidc 'acme'"));
        assert!(message.ends_with("(create the service accounts first)"));
    }

    #[test]
    fn test_missing_pagination_header_message() {
        let err = ApiError::MalformedPaginationHeader {
            header: "X-Pagination-Pagetotal",
            value: None,
        };
        assert_eq!(err.to_string(), "Malformed X-Pagination-Pagetotal header: <missing>");
    }

    #[test]
    fn test_not_found_classification() {
        let err = CloudsmithError::from(ApiError::NotFound {
            path: "/orgs/acme/teams/x/".to_string(),
        });
        assert!(err.is_not_found());
        assert!(!err.is_timeout());
    }
}
