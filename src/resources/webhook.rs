//! Repository webhooks.
//!
//! The webhook API has no modification timestamp and echoes the request on
//! update, so updates settle on a fixed delay before the final read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ReconcileError, Result};
use crate::reconcile::{Operation, RepoScope, ResourceApi, UpdateConvergence, to_request};

/// Events a webhook can subscribe to.
pub const WEBHOOK_EVENTS: &[&str] = &[
    "*",
    "package.created",
    "package.deleted",
    "package.downloaded",
    "package.failed",
    "package.quarantined",
    "package.released",
    "package.restored",
    "package.security_scanned",
    "package.synced",
    "package.syncing",
    "package.tags_updated",
];

/// Payload template for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTemplate {
    /// Event the template applies to.
    pub event: String,
    /// Template body.
    #[serde(default)]
    pub template: String,
}

/// Desired webhook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSpec {
    /// Delivery URL.
    pub target_url: String,
    /// Subscribed events.
    pub events: Vec<String>,
    /// Per-event templates; required by the API even when empty.
    #[serde(default)]
    pub templates: Vec<WebhookTemplate>,
    /// Whether deliveries are sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Package search query restricting which packages trigger deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_query: Option<String>,
    /// 0 JSON, 1 JSON array, 2 form-encoded, 3 handlebars template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_format: Option<u8>,
    /// Content type for templated bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,
    /// Header carrying the shared secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_header: Option<String>,
    /// Shared secret value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_value: Option<String>,
    /// HMAC signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_key: Option<String>,
    /// Whether TLS certificates are verified on delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_ssl: Option<bool>,
}

/// Observed webhook. Secrets are never echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// Owning namespace; restored from scope.
    #[serde(default)]
    pub namespace: String,
    /// Repository; restored from scope.
    #[serde(default)]
    pub repository: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Delivery URL.
    pub target_url: String,
    /// Subscribed events.
    #[serde(default)]
    pub events: Vec<String>,
    /// Whether deliveries are sent.
    #[serde(default)]
    pub is_active: bool,
    /// Package search query.
    #[serde(default)]
    pub package_query: Option<String>,
    /// Body format code.
    #[serde(default)]
    pub request_body_format: Option<u8>,
    /// Whether TLS certificates are verified.
    #[serde(default)]
    pub verify_ssl: Option<bool>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn invalid(message: String) -> crate::error::CloudsmithError {
    ReconcileError::InvalidDesiredState {
        kind: Webhook::KIND,
        message,
    }
    .into()
}

impl ResourceApi for Webhook {
    const KIND: &'static str = "webhook";
    const IMPORT_FORMAT: &'static str = "<namespace>.<repository>.<slug_perm>";
    const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::FixedDelay;

    type Scope = RepoScope;
    type Desired = WebhookSpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &RepoScope) -> String {
        format!("/webhooks/{}/{}/", scope.namespace, scope.repository)
    }

    fn create_request(_scope: &RepoScope, desired: &WebhookSpec) -> Result<serde_json::Value> {
        if !(desired.target_url.starts_with("https://") || desired.target_url.starts_with("http://")) {
            return Err(invalid(format!(
                "target_url must be an http(s) URL, got '{}'",
                desired.target_url
            )));
        }
        if desired.events.is_empty() {
            return Err(invalid(String::from("at least one event is required")));
        }
        if let Some(unknown) = desired
            .events
            .iter()
            .find(|e| !WEBHOOK_EVENTS.contains(&e.as_str()))
        {
            return Err(invalid(format!("unknown event '{unknown}'")));
        }
        if desired.request_body_format.is_some_and(|f| f > 3) {
            return Err(invalid(String::from("request_body_format must be between 0 and 3")));
        }

        to_request(Self::KIND, desired)
    }

    fn observe(mut payload: Self, scope: &RepoScope) -> Self {
        payload.namespace.clone_from(&scope.namespace);
        payload.repository.clone_from(&scope.repository);
        payload
    }

    fn identity(observed: &Self) -> &str {
        &observed.slug_perm
    }

    fn rejection_hint(_operation: Operation, error: &ApiError) -> Option<String> {
        matches!(error, ApiError::Unprocessable { .. }).then(|| {
            String::from(
                "check the event names and that templates are provided for a handlebars request_body_format",
            )
        })
    }
}
