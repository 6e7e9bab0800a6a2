//! OpenID Connect providers for an organization.
//!
//! A provider maps identity-token claims onto service accounts. The accounts
//! must already exist; the API answers 422 otherwise.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ApiError, ReconcileError, Result};
use crate::reconcile::{OrgScope, Operation, ResourceApi, to_request};

/// Desired OIDC provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OidcSpec {
    /// Provider name.
    pub name: String,
    /// Whether tokens from this provider are accepted.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Issuer URL.
    pub provider_url: String,
    /// Claims a token must carry.
    pub claims: BTreeMap<String, String>,
    /// Service account slugs granted to matching tokens.
    pub service_accounts: Vec<String>,
}

const fn default_enabled() -> bool {
    true
}

/// Observed OIDC provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oidc {
    /// Owning organization; restored from scope.
    #[serde(default)]
    pub organization: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Current slug.
    #[serde(default)]
    pub slug: String,
    /// Provider name.
    pub name: String,
    /// Whether tokens are accepted.
    #[serde(default)]
    pub enabled: bool,
    /// Issuer URL.
    pub provider_url: String,
    /// Required claims.
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
    /// Granted service accounts.
    #[serde(default)]
    pub service_accounts: Vec<String>,
}

impl ResourceApi for Oidc {
    const KIND: &'static str = "oidc";
    const IMPORT_FORMAT: &'static str = "<organization>.<slug_perm>";

    type Scope = OrgScope;
    type Desired = OidcSpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &OrgScope) -> String {
        format!("/orgs/{}/openid-connect/", scope.organization)
    }

    fn create_request(_scope: &OrgScope, desired: &OidcSpec) -> Result<serde_json::Value> {
        if desired.claims.is_empty() {
            return Err(ReconcileError::InvalidDesiredState {
                kind: Self::KIND,
                message: String::from("at least one claim is required"),
            }
            .into());
        }
        if !desired.provider_url.starts_with("https://") {
            return Err(ReconcileError::InvalidDesiredState {
                kind: Self::KIND,
                message: format!("provider_url must use https, got '{}'", desired.provider_url),
            }
            .into());
        }

        to_request(Self::KIND, desired)
    }

    fn observe(mut payload: Self, scope: &OrgScope) -> Self {
        payload.organization.clone_from(&scope.organization);
        payload
    }

    fn identity(observed: &Self) -> &str {
        &observed.slug_perm
    }

    fn rejection_hint(operation: Operation, error: &ApiError) -> Option<String> {
        match (operation, error) {
            (Operation::Create | Operation::Update, ApiError::Unprocessable { .. }) => Some(String::from(
                "every entry in service_accounts must be an existing service account in the organization; create them first",
            )),
            _ => None,
        }
    }
}
