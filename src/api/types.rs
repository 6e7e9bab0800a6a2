//! Wire-level types shared by every endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in server order.
    pub items: Vec<T>,
    /// Total page count reported by the server.
    pub total_pages: u32,
}

/// Page number and size for one listing request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
}

/// Opaque filters appended to a listing request.
///
/// The pager never inspects these; they travel unchanged to every page
/// fetch so that each page is cut from the same filtered result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    params: Vec<(String, String)>,
}

impl ListFilter {
    /// Creates an empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Adds a free-text search query, if set.
    #[must_use]
    pub fn query(self, query: Option<&str>) -> Self {
        self.param("query", query)
    }

    /// Adds a sort expression, if set.
    #[must_use]
    pub fn sort(self, sort: Option<&str>) -> Self {
        self.param("sort", sort)
    }

    /// Adds a boolean filter such as `active` or `is_active`, if set.
    #[must_use]
    pub fn flag(self, name: &str, value: Option<bool>) -> Self {
        let value = value.map(|v| if v { "true" } else { "false" });
        self.param(name, value)
    }

    /// Adds an arbitrary parameter, skipping unset and blank values.
    #[must_use]
    pub fn param(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.params.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Returns the query parameters in insertion order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// The authenticated principal, as reported by `/user/self/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSelf {
    /// Whether the key authenticated.
    #[serde(default)]
    pub authenticated: bool,
    /// User or service account slug.
    #[serde(default)]
    pub slug: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Error body returned by the API on 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, serde_json::Value>,
}

/// Renders an error body as one line: the detail, then each field error.
pub(crate) fn describe_error_body(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.trim().to_string();
    };

    let mut parts: Vec<String> = parsed.detail.into_iter().collect();
    for (field, value) in parsed.fields {
        let reasons = match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map_or_else(|| item.to_string(), String::from))
                .collect::<Vec<_>>()
                .join(", "),
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        parts.push(format!("{field}: {reasons}"));
    }

    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}
