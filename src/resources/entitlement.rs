//! Repository entitlement tokens.
//!
//! Entitlement updates are applied asynchronously; the lifecycle waits for
//! `updated_at` to move past its pre-update value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ReconcileError, Result};
use crate::reconcile::{Operation, RepoScope, ResourceApi, UpdateConvergence, to_request};

/// Desired entitlement token configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntitlementSpec {
    /// Token name.
    pub name: String,
    /// Whether the token can be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Start of the validity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_date_range_from: Option<DateTime<Utc>>,
    /// End of the validity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_date_range_to: Option<DateTime<Utc>>,
    /// Maximum distinct clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_num_clients: Option<u64>,
    /// Maximum downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_num_downloads: Option<u64>,
    /// Package search query restricting what the token can fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_package_query: Option<String>,
    /// Bandwidth limit, in `limit_bandwidth_unit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_bandwidth: Option<u64>,
    /// Bandwidth unit such as `Gigabyte`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_bandwidth_unit: Option<String>,
}

/// Observed entitlement token.
///
/// Also the item type of the entitlement listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Owning namespace; restored from scope.
    #[serde(default)]
    pub namespace: String,
    /// Repository; restored from scope.
    #[serde(default)]
    pub repository: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Token name.
    pub name: String,
    /// Token secret, only present when the caller may see it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Whether the token can be used.
    #[serde(default)]
    pub is_active: bool,
    /// Start of the validity window.
    #[serde(default)]
    pub limit_date_range_from: Option<DateTime<Utc>>,
    /// End of the validity window.
    #[serde(default)]
    pub limit_date_range_to: Option<DateTime<Utc>>,
    /// Maximum distinct clients.
    #[serde(default)]
    pub limit_num_clients: Option<u64>,
    /// Maximum downloads.
    #[serde(default)]
    pub limit_num_downloads: Option<u64>,
    /// Package search query.
    #[serde(default)]
    pub limit_package_query: Option<String>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceApi for Entitlement {
    const KIND: &'static str = "entitlement";
    const IMPORT_FORMAT: &'static str = "<namespace>.<repository>.<slug_perm>";
    const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::UpdatedAtAdvances;

    type Scope = RepoScope;
    type Desired = EntitlementSpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &RepoScope) -> String {
        format!("/entitlements/{}/{}/", scope.namespace, scope.repository)
    }

    fn create_request(_scope: &RepoScope, desired: &EntitlementSpec) -> Result<serde_json::Value> {
        if let (Some(from), Some(to)) = (desired.limit_date_range_from, desired.limit_date_range_to) {
            if from > to {
                return Err(ReconcileError::InvalidDesiredState {
                    kind: Self::KIND,
                    message: format!("limit_date_range_from ({from}) is after limit_date_range_to ({to})"),
                }
                .into());
            }
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

    fn updated_at(observed: &Self) -> Option<DateTime<Utc>> {
        observed.updated_at
    }

    fn rejection_hint(_operation: Operation, error: &ApiError) -> Option<String> {
        matches!(error, ApiError::Unprocessable { .. }).then(|| {
            String::from("check the date range and that numeric limits are not negative")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudsmithError;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let spec = EntitlementSpec {
            name: String::from("ci"),
            limit_date_range_from: Some(at("2025-02-01T00:00:00Z")),
            limit_date_range_to: Some(at("2025-01-01T00:00:00Z")),
            ..EntitlementSpec::default()
        };

        let err = Entitlement::create_request(&RepoScope::new("acme", "repo"), &spec).unwrap_err();
        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::InvalidDesiredState { kind: "entitlement", .. })
        ));
    }

    #[test]
    fn test_request_body() {
        let spec = EntitlementSpec {
            name: String::from("ci"),
            is_active: Some(true),
            limit_num_downloads: Some(500),
            ..EntitlementSpec::default()
        };

        let body = Entitlement::update_request(&RepoScope::new("acme", "repo"), &spec).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"name": "ci", "is_active": true, "limit_num_downloads": 500})
        );
    }

    #[test]
    fn test_paths() {
        let scope = RepoScope::new("acme", "repo");
        assert_eq!(Entitlement::collection_path(&scope), "/entitlements/acme/repo/");
        assert_eq!(Entitlement::item_path(&scope, "tok1"), "/entitlements/acme/repo/tok1/");
    }
}
