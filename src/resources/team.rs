//! Organization teams.

use serde::{Deserialize, Serialize};

use crate::reconcile::{OrgScope, ResourceApi};

/// Desired team configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamSpec {
    /// Display name.
    pub name: String,
    /// URL slug; derived from the name when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Visible` or `Private`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

/// Observed team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Owning organization; restored from scope.
    #[serde(default)]
    pub organization: String,
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
    pub visibility: String,
}

impl ResourceApi for Team {
    const KIND: &'static str = "team";
    const IMPORT_FORMAT: &'static str = "<organization>.<slug_perm>";

    type Scope = OrgScope;
    type Desired = TeamSpec;
    type Payload = Self;
    type Observed = Self;

    fn collection_path(scope: &OrgScope) -> String {
        format!("/orgs/{}/teams/", scope.organization)
    }

    fn observe(mut payload: Self, scope: &OrgScope) -> Self {
        payload.organization.clone_from(&scope.organization);
        payload
    }

    fn identity(observed: &Self) -> &str {
        &observed.slug_perm
    }
}
