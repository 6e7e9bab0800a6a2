// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning

// Tests unwrap freely.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Cloudsmith Reconcile
//!
//! The reconciliation core of an infrastructure-as-code provider for the
//! Cloudsmith package registry.
//!
//! ## Overview
//!
//! Every managed object moves through the same lifecycle:
//!
//! - **Create** sends the desired state, then waits until the object is
//!   visible before reporting it.
//! - **Read** refreshes the observed state and forgets objects that vanished.
//! - **Update** writes the desired state, then waits until the change is
//!   visible (immediately, once `updated_at` advances, or after a settle
//!   delay).
//! - **Delete** removes the object and waits until it is gone.
//! - **Import** recovers a managed object from a dotted key such as
//!   `acme.my-repo.XYZ123`.
//!
//! The registry is eventually consistent, so every mutation is followed by a
//! bounded poll (the waiter) and every listing is walked page by page (the
//! pager).
//!
//! ## Modules
//!
//! - [`api`]: HTTP client, status mapping and page headers
//! - [`reconcile`]: waiter, pager, lifecycle state machine and import keys
//! - [`resources`]: resource catalogue and dedicated lifecycles
//! - [`datasource`]: read-only listings and lookups
//! - [`config`]: provider configuration parsing and validation
//! - [`cli`]: command-line driver
//!
//! ## Example
//!
//! ```yaml
//! # cloudsmith.yaml
//! api_host: https://api.cloudsmith.io/v1
//! waits:
//!   create:
//!     timeout_secs: 60
//!     interval_secs: 2
//!   update:
//!     timeout_secs: 120
//!     interval_secs: 3
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod config;
pub mod datasource;
pub mod error;
pub mod reconcile;
pub mod resources;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::CloudsmithClient;
pub use config::{ConfigParser, ConfigValidator, ProviderConfig};
pub use datasource::RegistryObserver;
pub use error::{CloudsmithError, Result};
pub use reconcile::{Lifecycle, LifecycleState, ManagedResource, Pager, ResourceApi, wait};
pub use resources::ResourceKind;
