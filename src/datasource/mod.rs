//! Read-only lookups: packages, members, entitlement tokens, namespaces.

mod observer;
mod types;

pub use observer::{MOST_RECENT_SORT, RegistryObserver};
pub use types::{EntitlementQuery, Namespace, OrgMember, Package, PackageQuery};
