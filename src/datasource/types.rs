//! Records returned by read-only lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A package in a repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Permanent identifier.
    pub slug_perm: String,
    /// Package name.
    pub name: String,
    /// Version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Package format, such as `npm` or `deb`.
    #[serde(default)]
    pub format: String,
    /// Processing status, such as `Completed`.
    #[serde(default)]
    pub status_str: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Download count.
    #[serde(default)]
    pub downloads: u64,
    /// Upload time.
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// An organization member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMember {
    /// User slug.
    pub user: String,
    /// Organization role, such as `Owner` or `Member`.
    #[serde(default)]
    pub role: String,
    /// Whether the membership is active.
    #[serde(default)]
    pub is_active: bool,
    /// Contact email, if visible.
    #[serde(default)]
    pub email: Option<String>,
    /// When the member joined.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

/// A namespace (user or organization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace slug.
    pub slug: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// `User` or `Organization`.
    #[serde(default, rename = "type_name")]
    pub kind: String,
}

/// Filters for a package listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageQuery {
    /// Search query.
    pub query: Option<String>,
    /// Sort expression, such as `-date`.
    pub sort: Option<String>,
    /// Return only the newest match.
    pub most_recent: bool,
    /// Items per page; zero or less means the default.
    pub page_size: i64,
    /// Pages to fetch; zero or less means every page.
    pub page_count: i64,
}

/// Filters for an entitlement token listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementQuery {
    /// Search query.
    pub query: Option<String>,
    /// Only active (or inactive) tokens.
    pub active: Option<bool>,
    /// Include token secrets in the response.
    pub show_tokens: bool,
}
