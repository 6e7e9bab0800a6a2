//! Package repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::reconcile::{OrgScope, Operation, ResourceApi};

/// Desired repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySpec {
    /// Display name.
    pub name: String,
    /// URL slug; derived from the name when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Public`, `Private` or `Open`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_type_str: Option<String>,
    /// Storage region slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_region: Option<String>,
    /// Default privilege for organization members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_privilege: Option<String>,
    /// Whether package indexes are generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_files: Option<bool>,
}

/// Observed repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Owning namespace; restored from scope.
    #[serde(default)]
    pub namespace: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Current URL slug.
    #[serde(default)]
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Visibility.
    #[serde(default)]
    pub repository_type_str: String,
    /// Storage region.
    #[serde(default)]
    pub storage_region: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ResourceApi for Repository {
    const KIND: &'static str = "repository";
    const IMPORT_FORMAT: &'static str = "<organization>.<slug_perm>";

    type Scope = OrgScope;
    type Desired = RepositorySpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &OrgScope) -> String {
        format!("/repos/{}/", scope.organization)
    }

    fn observe(mut payload: Self, scope: &OrgScope) -> Self {
        payload.namespace.clone_from(&scope.organization);
        payload
    }

    fn identity(observed: &Self) -> &str {
        &observed.slug_perm
    }

    fn rejection_hint(_operation: Operation, error: &ApiError) -> Option<String> {
        matches!(error, ApiError::Unprocessable { .. }).then(|| {
            String::from("repository slugs must be unique within the organization")
        })
    }
}
