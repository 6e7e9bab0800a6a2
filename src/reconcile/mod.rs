//! Eventual-consistency reconciliation core.
//!
//! - [`waiter`]: bounded fixed-interval polling of a convergence check
//! - [`pager`]: sequential aggregation of page-numbered listings
//! - [`lifecycle`]: create/read/update/delete/import composed from the two
//! - [`managed`]: object-safe wrapper used to drive any resource by kind

pub mod import;
pub mod lifecycle;
pub mod managed;
pub mod pager;
pub mod scope;
pub mod waiter;

use serde::Serialize;
use std::fmt;

pub use import::{parse_import_key, parse_scope_key, split_key};
pub use lifecycle::{Lifecycle, ResourceApi, UpdateConvergence, UpdateMethod, to_request};
pub use managed::ManagedResource;
pub use pager::{DEFAULT_PAGE_SIZE, PageCursor, Pager};
pub use scope::{OrgScope, RepoScope, Scope};
pub use waiter::{AlwaysConvergesAfterFixedDelay, Check, Timeouts, WaitPolicy, wait};

/// The lifecycle operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new object.
    Create,
    /// Read the current object.
    Read,
    /// Update an existing object.
    Update,
    /// Delete an object.
    Delete,
    /// Recover identity from an import key.
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        f.write_str(name)
    }
}

/// Where a resource sits in its lifecycle.
///
/// `Present` and `Absent` are the only states visible between calls; the
/// other three exist only while a call is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No object is tracked.
    #[default]
    Absent,
    /// A create call is in flight.
    Creating,
    /// The object exists and its identity is tracked.
    Present,
    /// An update call is in flight.
    Updating,
    /// A delete call is in flight.
    Deleting,
}

impl LifecycleState {
    /// Returns true while a lifecycle call is running.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        f.write_str(name)
    }
}
