//! Scope identifiers that qualify a resource's identity.
//!
//! Some read endpoints do not echo their scope back, so lifecycles hold the
//! scope themselves and restore it into every observed record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scope that can be rebuilt from the leading parts of an import key.
pub trait Scope: Clone + fmt::Display + fmt::Debug + Send + Sync + 'static {
    /// Number of key parts the scope occupies.
    const PARTS: usize;

    /// Builds the scope from exactly [`Self::PARTS`] non-empty parts.
    ///
    /// Returns `None` if a part is not acceptable for this scope.
    fn from_parts(parts: &[&str]) -> Option<Self>;
}

/// An organization (namespace) scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgScope {
    /// Organization slug.
    pub organization: String,
}

/// A repository scope within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoScope {
    /// Owning namespace slug.
    pub namespace: String,
    /// Repository slug.
    pub repository: String,
}

impl OrgScope {
    /// Creates an organization scope.
    #[must_use]
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
        }
    }
}

impl RepoScope {
    /// Creates a repository scope.
    #[must_use]
    pub fn new(namespace: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            repository: repository.into(),
        }
    }
}

impl Scope for OrgScope {
    const PARTS: usize = 1;

    fn from_parts(parts: &[&str]) -> Option<Self> {
        match parts {
            [organization] => Some(Self::new(*organization)),
            _ => None,
        }
    }
}

impl Scope for RepoScope {
    const PARTS: usize = 2;

    fn from_parts(parts: &[&str]) -> Option<Self> {
        match parts {
            [namespace, repository] => Some(Self::new(*namespace, *repository)),
            _ => None,
        }
    }
}

impl fmt::Display for OrgScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.organization)
    }
}

impl fmt::Display for RepoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.repository)
    }
}
