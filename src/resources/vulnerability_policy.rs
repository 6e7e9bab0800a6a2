//! Organization vulnerability policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::reconcile::{OrgScope, Operation, ResourceApi, UpdateConvergence, UpdateMethod};

/// Minimum severity that triggers a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Critical.
    Critical,
}

/// Desired vulnerability policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VulnerabilityPolicySpec {
    /// Policy name.
    pub name: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Minimum severity that violates the policy.
    pub min_severity: Severity,
    /// Whether violating packages are quarantined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_violation_quarantine: Option<bool>,
    /// Whether vulnerabilities with no severity pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unknown_severity: Option<bool>,
    /// Package search query restricting the policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_query_string: Option<String>,
}

/// Observed vulnerability policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityPolicy {
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
    /// Minimum severity.
    pub min_severity: Severity,
    /// Whether violations quarantine.
    #[serde(default)]
    pub on_violation_quarantine: bool,
    /// Whether unknown severities pass.
    #[serde(default)]
    pub allow_unknown_severity: bool,
    /// Package search query.
    #[serde(default)]
    pub package_query_string: Option<String>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceApi for VulnerabilityPolicy {
    const KIND: &'static str = "vulnerability_policy";
    const IMPORT_FORMAT: &'static str = "<organization>.<slug_perm>";
    const UPDATE_METHOD: UpdateMethod = UpdateMethod::Put;
    const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::UpdatedAtAdvances;

    type Scope = OrgScope;
    type Desired = VulnerabilityPolicySpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &OrgScope) -> String {
        format!("/orgs/{}/vulnerability-policy/", scope.organization)
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
            .then(|| String::from("min_severity must be one of Low, Medium, High or Critical"))
    }
}
