//! Organization license policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ReconcileError, Result};
use crate::reconcile::{
    OrgScope, Operation, ResourceApi, UpdateConvergence, UpdateMethod, to_request,
};

/// Desired license policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicensePolicySpec {
    /// Policy name.
    pub name: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// SPDX identifiers the policy flags.
    pub spdx_identifiers: Vec<String>,
    /// Whether packages with no detectable license pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unknown_licenses: Option<bool>,
    /// Whether violating packages are quarantined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_violation_quarantine: Option<bool>,
    /// Package search query restricting the policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_query_string: Option<String>,
}

/// Observed license policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePolicy {
    /// Owning organization; restored from scope.
    #[serde(default)]
    pub organization: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Policy name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Flagged SPDX identifiers.
    #[serde(default)]
    pub spdx_identifiers: Vec<String>,
    /// Whether unknown licenses pass.
    #[serde(default)]
    pub allow_unknown_licenses: bool,
    /// Whether violations quarantine.
    #[serde(default)]
    pub on_violation_quarantine: bool,
    /// Package search query.
    #[serde(default)]
    pub package_query_string: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceApi for LicensePolicy {
    const KIND: &'static str = "license_policy";
    const IMPORT_FORMAT: &'static str = "<organization>.<slug_perm>";
    const UPDATE_METHOD: UpdateMethod = UpdateMethod::Put;
    const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::UpdatedAtAdvances;

    type Scope = OrgScope;
    type Desired = LicensePolicySpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &OrgScope) -> String {
        format!("/orgs/{}/license-policy/", scope.organization)
    }

    fn create_request(_scope: &OrgScope, desired: &LicensePolicySpec) -> Result<serde_json::Value> {
        if desired.spdx_identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err(ReconcileError::InvalidDesiredState {
                kind: Self::KIND,
                message: String::from("spdx_identifiers must not contain blank entries"),
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

    fn updated_at(observed: &Self) -> Option<DateTime<Utc>> {
        observed.updated_at
    }

    fn rejection_hint(_operation: Operation, error: &ApiError) -> Option<String> {
        matches!(error, ApiError::Unprocessable { .. })
            .then(|| String::from("spdx_identifiers must be valid SPDX license identifiers"))
    }
}
