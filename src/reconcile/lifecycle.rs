//! Generic resource lifecycle.
//!
//! A [`Lifecycle`] tracks one remote object through create, read, update,
//! delete and import. Each write is followed by a convergence wait and a
//! final read, so a call that returns `Ok` has observed its own write.
//!
//! Per-resource differences (paths, request shape, update method, which
//! convergence signal exists, error hints) live behind [`ResourceApi`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::fmt;
use tracing::{debug, info, warn};

use crate::api::CloudsmithClient;
use crate::error::{ApiError, CloudsmithError, ReconcileError, Result};

use super::import::parse_import_key;
use super::scope::Scope;
use super::waiter::{AlwaysConvergesAfterFixedDelay, Check, Timeouts, wait};
use super::{LifecycleState, Operation};

/// HTTP method used for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    /// Partial update.
    Patch,
    /// Full replacement.
    Put,
}

/// How an update is known to have converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateConvergence {
    /// The write response is authoritative; no wait.
    Immediate,
    /// Poll until `updated_at` is later than it was before the write.
    UpdatedAtAdvances,
    /// No signal exists; sleep the settle delay and re-read.
    FixedDelay,
}

/// Describes one remote resource type to the generic lifecycle.
pub trait ResourceApi: Send + Sync + 'static {
    /// Short kind name used in logs and errors.
    const KIND: &'static str;
    /// Human-readable import key format.
    const IMPORT_FORMAT: &'static str;
    /// Update method.
    const UPDATE_METHOD: UpdateMethod = UpdateMethod::Patch;
    /// Update convergence signal.
    const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::Immediate;

    /// Scope that qualifies the identity.
    type Scope: Scope;
    /// Desired configuration supplied by the caller.
    type Desired: Serialize + DeserializeOwned + Send + Sync;
    /// Raw API response body.
    type Payload: DeserializeOwned + Send;
    /// Normalized observed state returned to the caller.
    type Observed: Serialize + Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Collection endpoint, with trailing slash.
    fn collection_path(scope: &Self::Scope) -> String;

    /// Item endpoint for a permanent identifier.
    fn item_path(scope: &Self::Scope, identity: &str) -> String {
        format!("{}{identity}/", Self::collection_path(scope))
    }

    /// Builds the create request body.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidDesiredState`] if the desired state
    /// cannot be expressed as a request.
    fn create_request(scope: &Self::Scope, desired: &Self::Desired) -> Result<serde_json::Value> {
        let _ = scope;
        to_request(Self::KIND, desired)
    }

    /// Builds the update request body. Defaults to the create body.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidDesiredState`] if the desired state
    /// cannot be expressed as a request.
    fn update_request(scope: &Self::Scope, desired: &Self::Desired) -> Result<serde_json::Value> {
        Self::create_request(scope, desired)
    }

    /// Normalizes a response body, restoring scope fields the API omits.
    fn observe(payload: Self::Payload, scope: &Self::Scope) -> Self::Observed;

    /// Permanent identifier of an observed object.
    fn identity(observed: &Self::Observed) -> &str;

    /// Server-side modification time, if the resource reports one.
    fn updated_at(observed: &Self::Observed) -> Option<DateTime<Utc>> {
        let _ = observed;
        None
    }

    /// User-actionable hint for a rejected request.
    fn rejection_hint(operation: Operation, error: &ApiError) -> Option<String> {
        let _ = (operation, error);
        None
    }
}

/// Serializes desired state into a JSON request body.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidDesiredState`] if serialization fails.
pub fn to_request<T: Serialize + ?Sized>(kind: &'static str, desired: &T) -> Result<serde_json::Value> {
    serde_json::to_value(desired).map_err(|e| {
        ReconcileError::InvalidDesiredState {
            kind,
            message: e.to_string(),
        }
        .into()
    })
}

/// Returns true when `after` shows the object was modified since `before`.
///
/// An object with no prior timestamp counts as advanced once it is readable;
/// one that loses its timestamp does not.
fn has_advanced(before: Option<DateTime<Utc>>, after: Option<DateTime<Utc>>) -> bool {
    match (before, after) {
        (Some(before), Some(after)) => after > before,
        (None, _) => true,
        (Some(_), None) => false,
    }
}

/// One tracked remote object.
pub struct Lifecycle<'c, R: ResourceApi> {
    client: &'c CloudsmithClient,
    timeouts: Timeouts,
    scope: R::Scope,
    identity: Option<String>,
    observed: Option<R::Observed>,
    state: LifecycleState,
}

impl<R: ResourceApi> fmt::Debug for Lifecycle<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("kind", &R::KIND)
            .field("scope", &self.scope)
            .field("identity", &self.identity)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'c, R: ResourceApi> Lifecycle<'c, R> {
    /// Creates a lifecycle with no tracked object.
    #[must_use]
    pub const fn new(client: &'c CloudsmithClient, timeouts: Timeouts, scope: R::Scope) -> Self {
        Self {
            client,
            timeouts,
            scope,
            identity: None,
            observed: None,
            state: LifecycleState::Absent,
        }
    }

    /// Creates a lifecycle tracking a known identity.
    #[must_use]
    pub fn with_identity(
        client: &'c CloudsmithClient,
        timeouts: Timeouts,
        scope: R::Scope,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            identity: Some(identity.into()),
            state: LifecycleState::Present,
            ..Self::new(client, timeouts, scope)
        }
    }

    /// Recovers a lifecycle from an import key and reads the object.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidImportId`] if the key has the wrong
    /// shape (no request is made), or an operation failure if the object
    /// does not exist or cannot be read.
    pub async fn import(client: &'c CloudsmithClient, timeouts: Timeouts, key: &str) -> Result<Self> {
        let (scope, identity) = parse_import_key::<R::Scope>(R::KIND, key, R::IMPORT_FORMAT)?;
        let mut lifecycle = Self::with_identity(client, timeouts, scope, identity);
        let target = lifecycle.target();
        let path = lifecycle.path()?;

        info!("Importing {} '{target}'", R::KIND);

        match lifecycle.read().await? {
            Some(_) => Ok(lifecycle),
            None => Err(ReconcileError::OperationFailed {
                kind: R::KIND,
                target,
                operation: Operation::Import,
                source: ApiError::NotFound { path },
                hint: Some(String::from("check the import ID; nothing exists at that address")),
            }
            .into()),
        }
    }

    /// Tracked permanent identifier.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Scope the object lives in.
    #[must_use]
    pub const fn scope(&self) -> &R::Scope {
        &self.scope
    }

    /// Last observed state.
    #[must_use]
    pub const fn observed(&self) -> Option<&R::Observed> {
        self.observed.as_ref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    fn target(&self) -> String {
        match &self.identity {
            Some(identity) => format!("{}/{identity}", self.scope),
            None => self.scope.to_string(),
        }
    }

    fn describe(&self) -> String {
        format!("{} {}", R::KIND, self.target())
    }

    fn require_identity(&self) -> Result<String> {
        self.identity.clone().ok_or_else(|| {
            ReconcileError::NotManaged {
                kind: R::KIND,
                scope: self.scope.to_string(),
            }
            .into()
        })
    }

    fn path(&self) -> Result<String> {
        Ok(R::item_path(&self.scope, &self.require_identity()?))
    }

    fn settle(&mut self) {
        self.state = if self.identity.is_some() {
            LifecycleState::Present
        } else {
            LifecycleState::Absent
        };
    }

    /// Wraps an API failure with operation context; transport, credential
    /// and reconciliation errors pass through unchanged.
    fn failure(&self, operation: Operation, err: CloudsmithError) -> CloudsmithError {
        match err {
            CloudsmithError::Api(
                ApiError::Transport { .. }
                | ApiError::AuthenticationFailed { .. }
                | ApiError::RateLimited { .. },
            ) => err,
            CloudsmithError::Api(source) => {
                let hint = R::rejection_hint(operation, &source);
                ReconcileError::OperationFailed {
                    kind: R::KIND,
                    target: self.target(),
                    operation,
                    source,
                    hint,
                }
                .into()
            }
            other => other,
        }
    }

    /// Wraps a failed write. A 404 means the object is gone, so the identity
    /// is forgotten the same way [`Lifecycle::read`] forgets it.
    fn vanished(&mut self, operation: Operation, err: CloudsmithError) -> CloudsmithError {
        if err.is_not_found() {
            warn!("{} no longer exists, clearing tracked identity", self.describe());
            self.identity = None;
            self.observed = None;
        }
        self.failure(operation, err)
    }

    /// Creates the object, waits until it is readable, then reads it back.
    ///
    /// If the wait times out the identity stays tracked: the object exists
    /// and a later read or delete can still address it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::AlreadyManaged`] if an identity is already
    /// tracked, an operation failure if the API rejects the request, or a
    /// timeout if the object never becomes visible.
    pub async fn create(&mut self, desired: &R::Desired) -> Result<R::Observed> {
        if let Some(identity) = &self.identity {
            return Err(ReconcileError::AlreadyManaged {
                kind: R::KIND,
                identity: identity.clone(),
            }
            .into());
        }

        self.state = LifecycleState::Creating;
        let outcome = self.create_inner(desired).await;
        self.settle();
        outcome
    }

    async fn create_inner(&mut self, desired: &R::Desired) -> Result<R::Observed> {
        let body = R::create_request(&self.scope, desired)?;

        info!("Creating {} in {}", R::KIND, self.scope);
        let payload: R::Payload = self
            .client
            .post(&R::collection_path(&self.scope), &body)
            .await
            .map_err(|e| self.failure(Operation::Create, e))?;

        let created = R::observe(payload, &self.scope);
        let identity = R::identity(&created).to_string();
        self.identity = Some(identity.clone());
        info!("Created {} (slug_perm: {identity})", self.describe());

        let client = self.client;
        let path = R::item_path(&self.scope, &identity);
        let probe = path.as_str();
        wait(
            move || async move { Check::until_present(client.get::<IgnoredAny>(probe).await) },
            self.timeouts.create,
            &self.describe(),
            Operation::Create,
        )
        .await
        .map_err(|e| self.failure(Operation::Create, e))?;

        self.read_converged(Operation::Create).await
    }

    /// Reads the tracked object.
    ///
    /// A 404 means the object was deleted out of band: the identity is
    /// cleared and `Ok(None)` is returned so the caller can plan a re-create.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotManaged`] without an identity, or an
    /// operation failure for non-404 API errors.
    pub async fn read(&mut self) -> Result<Option<R::Observed>> {
        let path = self.path()?;

        match self.client.get::<R::Payload>(&path).await {
            Ok(payload) => {
                let observed = R::observe(payload, &self.scope);
                self.observed = Some(observed.clone());
                if !self.state.is_transient() {
                    self.settle();
                }
                Ok(Some(observed))
            }
            Err(e) if e.is_not_found() => {
                warn!("{} no longer exists, clearing tracked identity", self.describe());
                self.identity = None;
                self.observed = None;
                if !self.state.is_transient() {
                    self.settle();
                }
                Ok(None)
            }
            Err(e) => Err(self.failure(Operation::Read, e)),
        }
    }

    /// Reads after a converged write; absence at this point is a failure.
    async fn read_converged(&mut self, operation: Operation) -> Result<R::Observed> {
        let target = self.target();
        let path = self.path()?;

        self.read().await?.ok_or_else(|| {
            ReconcileError::OperationFailed {
                kind: R::KIND,
                target,
                operation,
                source: ApiError::NotFound { path },
                hint: Some(String::from("the object disappeared after the write converged")),
            }
            .into()
        })
    }

    /// Applies `desired` to the tracked object and waits for convergence.
    ///
    /// If the object turns out to be gone (404 on the pre-write read or on
    /// the write itself) the identity is cleared and the lifecycle settles
    /// to `Absent`, as after a read.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotManaged`] without an identity, an
    /// operation failure if the API rejects the request, or a timeout if
    /// the change never becomes visible.
    pub async fn update(&mut self, desired: &R::Desired) -> Result<R::Observed> {
        let identity = self.require_identity()?;

        self.state = LifecycleState::Updating;
        let outcome = self.update_inner(&identity, desired).await;
        self.settle();
        outcome
    }

    async fn update_inner(&mut self, identity: &str, desired: &R::Desired) -> Result<R::Observed> {
        let path = R::item_path(&self.scope, identity);

        let before = if R::UPDATE_CONVERGENCE == UpdateConvergence::UpdatedAtAdvances {
            let payload: R::Payload = self
                .client
                .get(&path)
                .await
                .map_err(|e| self.vanished(Operation::Update, e))?;
            R::updated_at(&R::observe(payload, &self.scope))
        } else {
            None
        };

        let body = R::update_request(&self.scope, desired)?;

        info!("Updating {}", self.describe());
        let written: Result<R::Payload> = match R::UPDATE_METHOD {
            UpdateMethod::Patch => self.client.patch(&path, &body).await,
            UpdateMethod::Put => self.client.put(&path, &body).await,
        };
        written.map_err(|e| self.vanished(Operation::Update, e))?;

        self.converge_update(&path, before)
            .await
            .map_err(|e| self.failure(Operation::Update, e))?;

        self.read_converged(Operation::Update).await
    }

    async fn converge_update(&self, path: &str, before: Option<DateTime<Utc>>) -> Result<()> {
        let resource = self.describe();
        let policy = self.timeouts.update;

        match R::UPDATE_CONVERGENCE {
            UpdateConvergence::Immediate => Ok(()),
            UpdateConvergence::UpdatedAtAdvances => {
                let client = self.client;
                let scope = &self.scope;
                wait(
                    move || async move {
                        match client.get::<R::Payload>(path).await {
                            Ok(payload) => {
                                let after = R::updated_at(&R::observe(payload, scope));
                                if has_advanced(before, after) {
                                    Check::Done
                                } else {
                                    Check::Retry
                                }
                            }
                            Err(e) if e.is_not_found() => Check::Retry,
                            Err(e) => Check::Fatal(e),
                        }
                    },
                    policy,
                    &resource,
                    Operation::Update,
                )
                .await
            }
            UpdateConvergence::FixedDelay => {
                let degraded = AlwaysConvergesAfterFixedDelay::new(self.timeouts.settle_delay);
                debug!(
                    "{resource} exposes no convergence signal, settling for {}ms",
                    self.timeouts.settle_delay.as_millis()
                );
                wait(move || degraded.check(), policy, &resource, Operation::Update).await
            }
        }
    }

    /// Deletes the tracked object and waits until reads return 404.
    ///
    /// A 404 from the delete itself counts as already deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotManaged`] without an identity, an
    /// operation failure if the API rejects the request, or a timeout if
    /// the object stays readable.
    pub async fn delete(&mut self) -> Result<()> {
        let identity = self.require_identity()?;

        self.state = LifecycleState::Deleting;
        let outcome = self.delete_inner(&identity).await;
        self.settle();
        outcome
    }

    async fn delete_inner(&mut self, identity: &str) -> Result<()> {
        let path = R::item_path(&self.scope, identity);

        info!("Deleting {}", self.describe());
        match self.client.delete(&path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("{} was already deleted", self.describe()),
            Err(e) => return Err(self.failure(Operation::Delete, e)),
        }

        let client = self.client;
        let probe = path.as_str();
        wait(
            move || async move { Check::until_absent(client.get::<IgnoredAny>(probe).await) },
            self.timeouts.delete,
            &self.describe(),
            Operation::Delete,
        )
        .await
        .map_err(|e| self.failure(Operation::Delete, e))?;

        info!("Deleted {}", self.describe());
        self.identity = None;
        self.observed = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{RepoScope, WaitPolicy};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct WidgetSpec {
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct WidgetPayload {
        slug_perm: String,
        name: String,
        #[serde(default)]
        updated_at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct WidgetState {
        namespace: String,
        repository: String,
        slug_perm: String,
        name: String,
        updated_at: Option<DateTime<Utc>>,
    }

    fn observe_widget(payload: WidgetPayload, scope: &RepoScope) -> WidgetState {
        WidgetState {
            namespace: scope.namespace.clone(),
            repository: scope.repository.clone(),
            slug_perm: payload.slug_perm,
            name: payload.name,
            updated_at: payload.updated_at,
        }
    }

    /// Widget whose writes are visible immediately.
    struct Widget;

    impl ResourceApi for Widget {
        const KIND: &'static str = "widget";
        const IMPORT_FORMAT: &'static str = "<ns>.<repo>.<slug_perm>";

        type Scope = RepoScope;
        type Desired = WidgetSpec;
        type Payload = WidgetPayload;
        type Observed = WidgetState;

        fn collection_path(scope: &RepoScope) -> String {
            format!("/widgets/{}/{}/", scope.namespace, scope.repository)
        }

        fn observe(payload: WidgetPayload, scope: &RepoScope) -> WidgetState {
            observe_widget(payload, scope)
        }

        fn identity(observed: &WidgetState) -> &str {
            &observed.slug_perm
        }

        fn rejection_hint(operation: Operation, error: &ApiError) -> Option<String> {
            match (operation, error) {
                (Operation::Create, ApiError::Unprocessable { .. }) => {
                    Some(String::from("widget names must be unique"))
                }
                _ => None,
            }
        }
    }

    /// Widget whose updates converge when `updated_at` advances.
    struct StampedWidget;

    impl ResourceApi for StampedWidget {
        const KIND: &'static str = "stamped-widget";
        const IMPORT_FORMAT: &'static str = "<ns>.<repo>.<slug_perm>";
        const UPDATE_METHOD: UpdateMethod = UpdateMethod::Put;
        const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::UpdatedAtAdvances;

        type Scope = RepoScope;
        type Desired = WidgetSpec;
        type Payload = WidgetPayload;
        type Observed = WidgetState;

        fn collection_path(scope: &RepoScope) -> String {
            Widget::collection_path(scope)
        }

        fn observe(payload: WidgetPayload, scope: &RepoScope) -> WidgetState {
            observe_widget(payload, scope)
        }

        fn identity(observed: &WidgetState) -> &str {
            &observed.slug_perm
        }

        fn updated_at(observed: &WidgetState) -> Option<DateTime<Utc>> {
            observed.updated_at
        }
    }

    fn fast_timeouts() -> Timeouts {
        let policy = WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(20));
        Timeouts {
            create: policy,
            update: policy,
            delete: policy,
            settle_delay: Duration::from_millis(10),
        }
    }

    fn client_for(server: &MockServer) -> CloudsmithClient {
        CloudsmithClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri())
    }

    fn scope() -> RepoScope {
        RepoScope::new("acme", "my-repo")
    }

    fn widget(slug_perm: &str, name: &str) -> serde_json::Value {
        json!({"slug_perm": slug_perm, "name": name})
    }

    fn spec(name: &str) -> WidgetSpec {
        WidgetSpec {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_waits_until_visible() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widgets/acme/my-repo/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(widget("w1", "alpha")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("w1", "alpha")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::new(&client, fast_timeouts(), scope());

        let observed = lifecycle.create(&spec("alpha")).await.unwrap();

        assert_eq!(observed.slug_perm, "w1");
        assert_eq!(observed.namespace, "acme");
        assert_eq!(observed.repository, "my-repo");
        assert_eq!(lifecycle.identity(), Some("w1"));
        assert_eq!(lifecycle.state(), LifecycleState::Present);

        // 404 probe, 200 probe, final read.
        let gets = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "GET")
            .count();
        assert_eq!(gets, 3);
    }

    #[tokio::test]
    async fn test_create_refuses_managed_identity() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        let err = lifecycle.create(&spec("alpha")).await.unwrap_err();

        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::AlreadyManaged { .. })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejection_carries_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widgets/acme/my-repo/"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": "name taken"})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::new(&client, fast_timeouts(), scope());

        let err = lifecycle.create(&spec("alpha")).await.unwrap_err();

        match err {
            CloudsmithError::Reconcile(ReconcileError::OperationFailed {
                operation,
                source,
                hint,
                ..
            }) => {
                assert_eq!(operation, Operation::Create);
                assert!(matches!(source, ApiError::Unprocessable { .. }));
                assert_eq!(hint.as_deref(), Some("widget names must be unique"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);
    }

    #[tokio::test]
    async fn test_create_timeout_keeps_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widgets/acme/my-repo/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(widget("w9", "slow")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w9/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut timeouts = fast_timeouts();
        timeouts.create = WaitPolicy::new(Duration::from_millis(100), Duration::from_millis(20));
        let mut lifecycle = Lifecycle::<Widget>::new(&client, timeouts, scope());

        let err = lifecycle.create(&spec("slow")).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(lifecycle.identity(), Some("w9"));
        assert_eq!(lifecycle.state(), LifecycleState::Present);
    }

    #[tokio::test]
    async fn test_read_not_found_clears_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/gone/"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "gone");

        assert_eq!(lifecycle.read().await.unwrap(), None);
        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);

        let err = lifecycle.read().await.unwrap_err();
        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::NotManaged { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("w1", "alpha")))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        let first = lifecycle.read().await.unwrap();
        let second = lifecycle.read().await.unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(lifecycle.observed(), second.as_ref());
    }

    #[tokio::test]
    async fn test_read_server_error_is_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        let err = lifecycle.read().await.unwrap_err();
        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::OperationFailed {
                operation: Operation::Read,
                source: ApiError::RequestFailed { status: 503, .. },
                ..
            })
        ));
        assert_eq!(lifecycle.identity(), Some("w1"));
    }

    #[tokio::test]
    async fn test_update_waits_for_updated_at_to_advance() {
        let server = MockServer::start().await;
        let stale = json!({"slug_perm": "w1", "name": "alpha", "updated_at": "2024-05-01T10:00:00Z"});
        let fresh = json!({"slug_perm": "w1", "name": "beta", "updated_at": "2024-05-01T10:00:05Z"});

        Mock::given(method("PUT"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fresh.clone()))
            .expect(1)
            .mount(&server)
            .await;
        // Pre-write read and the first convergence probe still see the old stamp.
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stale))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fresh))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle =
            Lifecycle::<StampedWidget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        let observed = lifecycle.update(&spec("beta")).await.unwrap();

        assert_eq!(observed.name, "beta");
        assert_eq!(lifecycle.state(), LifecycleState::Present);

        // Pre-write read, stale probe, fresh probe, final read.
        let gets = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "GET")
            .count();
        assert_eq!(gets, 4);
    }

    #[tokio::test]
    async fn test_update_times_out_when_stamp_never_moves() {
        let server = MockServer::start().await;
        let stale = json!({"slug_perm": "w1", "name": "alpha", "updated_at": "2024-05-01T10:00:00Z"});

        Mock::given(method("PUT"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stale.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stale))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut timeouts = fast_timeouts();
        timeouts.update = WaitPolicy::new(Duration::from_millis(100), Duration::from_millis(20));
        let mut lifecycle = Lifecycle::<StampedWidget>::with_identity(&client, timeouts, scope(), "w1");

        let err = lifecycle.update(&spec("beta")).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(lifecycle.identity(), Some("w1"));
    }

    #[tokio::test]
    async fn test_update_of_vanished_object_clears_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle =
            Lifecycle::<StampedWidget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        let err = lifecycle.update(&spec("beta")).await.unwrap_err();

        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::OperationFailed {
                operation: Operation::Update,
                source: ApiError::NotFound { .. },
                ..
            })
        ));
        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.observed(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);

        // No write was attempted.
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
    }

    #[tokio::test]
    async fn test_update_immediate_uses_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("w1", "beta")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("w1", "beta")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        assert_eq!(lifecycle.update(&spec("beta")).await.unwrap().name, "beta");
    }

    #[tokio::test]
    async fn test_delete_waits_until_absent() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("w1", "alpha")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        lifecycle.delete().await.unwrap();

        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);
    }

    #[tokio::test]
    async fn test_delete_timeout_keeps_identity() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("w1", "alpha")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut timeouts = fast_timeouts();
        timeouts.delete = WaitPolicy::new(Duration::from_millis(100), Duration::from_millis(20));
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, timeouts, scope(), "w1");

        let err = lifecycle.delete().await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(lifecycle.identity(), Some("w1"));
        assert_eq!(lifecycle.state(), LifecycleState::Present);
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/w1/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut lifecycle = Lifecycle::<Widget>::with_identity(&client, fast_timeouts(), scope(), "w1");

        lifecycle.delete().await.unwrap();
        assert_eq!(lifecycle.identity(), None);
    }

    #[tokio::test]
    async fn test_import_recovers_scope_and_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/XYZ123/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget("XYZ123", "imported")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let lifecycle = Lifecycle::<Widget>::import(&client, fast_timeouts(), "acme.my-repo.XYZ123")
            .await
            .unwrap();

        assert_eq!(lifecycle.scope(), &scope());
        assert_eq!(lifecycle.identity(), Some("XYZ123"));
        assert_eq!(lifecycle.observed().map(|o| o.name.as_str()), Some("imported"));
    }

    #[tokio::test]
    async fn test_import_rejects_bad_key_without_requests() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let err = Lifecycle::<Widget>::import(&client, fast_timeouts(), "acme.XYZ123")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::InvalidImportId {
                expected: 3,
                found: 2,
                ..
            })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_of_missing_object_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/acme/my-repo/nope/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = Lifecycle::<Widget>::import(&client, fast_timeouts(), "acme.my-repo.nope")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::OperationFailed {
                operation: Operation::Import,
                source: ApiError::NotFound { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_has_advanced() {
        let t0 = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t1 = t0 + chrono::Duration::seconds(1);

        assert!(has_advanced(Some(t0), Some(t1)));
        assert!(!has_advanced(Some(t0), Some(t0)));
        assert!(!has_advanced(Some(t1), Some(t0)));
        assert!(has_advanced(None, None));
        assert!(!has_advanced(Some(t0), None));
    }
}
