//! Object-safe lifecycle driver.
//!
//! The command line picks a resource kind at runtime, so it drives
//! lifecycles through [`ManagedResource`], which exchanges desired and
//! observed state as JSON values.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CloudsmithError, ReconcileError, Result};

use super::LifecycleState;
use super::lifecycle::{Lifecycle, ResourceApi};

/// A lifecycle driven through JSON.
#[async_trait]
pub trait ManagedResource: Send {
    /// Resource kind name.
    fn kind(&self) -> &'static str;

    /// Tracked permanent identifier.
    fn identity(&self) -> Option<&str>;

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;

    /// Last observed state, as JSON.
    fn observed(&self) -> Result<Option<Value>>;

    /// Creates the object from a desired-state document.
    async fn create(&mut self, desired: Value) -> Result<Value>;

    /// Reads the object; `None` if it no longer exists.
    async fn read(&mut self) -> Result<Option<Value>>;

    /// Applies a desired-state document to the object.
    async fn update(&mut self, desired: Value) -> Result<Value>;

    /// Deletes the object.
    async fn delete(&mut self) -> Result<()>;
}

/// Decodes a desired-state document for `kind`.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidDesiredState`] if the document does not
/// match the resource's schema.
pub fn decode_desired<D: DeserializeOwned>(kind: &'static str, desired: Value) -> Result<D> {
    serde_json::from_value(desired).map_err(|e| {
        ReconcileError::InvalidDesiredState {
            kind,
            message: e.to_string(),
        }
        .into()
    })
}

/// Encodes observed state as JSON.
///
/// # Errors
///
/// Returns an internal error if serialization fails.
pub fn encode_observed<O: Serialize>(observed: &O) -> Result<Value> {
    serde_json::to_value(observed)
        .map_err(|e| CloudsmithError::internal(format!("Failed to encode observed state: {e}")))
}

#[async_trait]
impl<'c, R: ResourceApi> ManagedResource for Lifecycle<'c, R> {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn identity(&self) -> Option<&str> {
        Lifecycle::identity(self)
    }

    fn state(&self) -> LifecycleState {
        Lifecycle::state(self)
    }

    fn observed(&self) -> Result<Option<Value>> {
        Lifecycle::observed(self).map(encode_observed).transpose()
    }

    async fn create(&mut self, desired: Value) -> Result<Value> {
        let desired: R::Desired = decode_desired(R::KIND, desired)?;
        let observed = Lifecycle::create(self, &desired).await?;
        encode_observed(&observed)
    }

    async fn read(&mut self) -> Result<Option<Value>> {
        Lifecycle::read(self)
            .await?
            .map(|observed| encode_observed(&observed))
            .transpose()
    }

    async fn update(&mut self, desired: Value) -> Result<Value> {
        let desired: R::Desired = decode_desired(R::KIND, desired)?;
        let observed = Lifecycle::update(self, &desired).await?;
        encode_observed(&observed)
    }

    async fn delete(&mut self) -> Result<()> {
        Lifecycle::delete(self).await
    }
}
