//! SAML group sync mappings.
//!
//! The API offers list, create and delete but neither a single-item read
//! nor an update. Reads walk the list and match on `slug_perm`; updates are
//! a delete followed by a create, which is not atomic.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{CloudsmithClient, ListFilter};
use crate::error::{ApiError, CloudsmithError, ReconcileError, Result};
use crate::reconcile::{
    Check, LifecycleState, OrgScope, Operation, Pager, Timeouts, parse_import_key, to_request,
    wait,
};

/// Kind name.
pub const KIND: &str = "saml_group_sync";

/// Import key format.
pub const IMPORT_FORMAT: &str = "<organization>.<slug_perm>";

/// Team role granted by a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamRole {
    /// Regular team member.
    Member,
    /// Team manager.
    Manager,
}

/// Desired mapping from an identity-provider attribute to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamlGroupSyncSpec {
    /// SAML attribute name.
    pub idp_key: String,
    /// SAML attribute value.
    pub idp_value: String,
    /// Role granted in the team.
    pub role: TeamRole,
    /// Team slug.
    pub team: String,
}

/// Observed mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlGroupSync {
    /// Owning organization; restored from scope.
    #[serde(default)]
    pub organization: String,
    /// Permanent identifier.
    pub slug_perm: String,
    /// SAML attribute name.
    pub idp_key: String,
    /// SAML attribute value.
    pub idp_value: String,
    /// Role granted in the team.
    pub role: TeamRole,
    /// Team slug.
    pub team: String,
}

fn collection_path(scope: &OrgScope) -> String {
    format!("/orgs/{}/saml-group-sync/", scope.organization)
}

/// Finds one mapping by walking the whole listing.
async fn find(
    client: &CloudsmithClient,
    scope: &OrgScope,
    identity: &str,
) -> Result<Option<SamlGroupSync>> {
    let path = collection_path(scope);
    let path = path.as_str();
    let filter = &ListFilter::new();
    let all: Vec<SamlGroupSync> = Pager::all()
        .fetch_all(move |request| client.list_page(path, request, filter))
        .await?;

    Ok(all.into_iter().find(|m| m.slug_perm == identity).map(|mut m| {
        m.organization.clone_from(&scope.organization);
        m
    }))
}

/// Lifecycle for one SAML group sync mapping.
#[derive(Debug)]
pub struct SamlGroupSyncLifecycle<'c> {
    client: &'c CloudsmithClient,
    timeouts: Timeouts,
    scope: OrgScope,
    identity: Option<String>,
    observed: Option<SamlGroupSync>,
    state: LifecycleState,
}

impl<'c> SamlGroupSyncLifecycle<'c> {
    /// Creates a lifecycle with no tracked mapping.
    #[must_use]
    pub const fn new(client: &'c CloudsmithClient, timeouts: Timeouts, scope: OrgScope) -> Self {
        Self {
            client,
            timeouts,
            scope,
            identity: None,
            observed: None,
            state: LifecycleState::Absent,
        }
    }

    /// Recovers a mapping from `<organization>.<slug_perm>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed or the mapping is not listed.
    pub async fn import(client: &'c CloudsmithClient, timeouts: Timeouts, key: &str) -> Result<Self> {
        let (scope, identity) = parse_import_key::<OrgScope>(KIND, key, IMPORT_FORMAT)?;
        let path = collection_path(&scope);
        let target = format!("{scope}/{identity}");

        let mut lifecycle = Self {
            identity: Some(identity),
            state: LifecycleState::Present,
            ..Self::new(client, timeouts, scope)
        };

        info!("Importing {KIND} '{target}'");
        match lifecycle.read().await? {
            Some(_) => Ok(lifecycle),
            None => Err(ReconcileError::OperationFailed {
                kind: KIND,
                target,
                operation: Operation::Import,
                source: ApiError::NotFound { path },
                hint: Some(String::from("no mapping with that slug_perm is listed")),
            }
            .into()),
        }
    }

    /// Tracked permanent identifier.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Last observed mapping.
    #[must_use]
    pub const fn observed(&self) -> Option<&SamlGroupSync> {
        self.observed.as_ref()
    }

    fn target(&self) -> String {
        match &self.identity {
            Some(identity) => format!("{}/{identity}", self.scope),
            None => self.scope.to_string(),
        }
    }

    fn describe(&self) -> String {
        format!("{KIND} {}", self.target())
    }

    fn require_identity(&self) -> Result<String> {
        self.identity.clone().ok_or_else(|| {
            ReconcileError::NotManaged {
                kind: KIND,
                scope: self.scope.to_string(),
            }
            .into()
        })
    }

    fn settle(&mut self) {
        self.state = if self.identity.is_some() {
            LifecycleState::Present
        } else {
            LifecycleState::Absent
        };
    }

    fn failure(&self, operation: Operation, err: CloudsmithError) -> CloudsmithError {
        match err {
            CloudsmithError::Api(
                source @ (ApiError::Unprocessable { .. }
                | ApiError::RequestFailed { .. }
                | ApiError::NotFound { .. }),
            ) => {
                let hint = matches!(source, ApiError::Unprocessable { .. }).then(|| {
                    String::from("the team must exist and the idp_key/idp_value pair must be unique")
                });
                ReconcileError::OperationFailed {
                    kind: KIND,
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

    /// Creates the mapping and waits until it is listed.
    ///
    /// # Errors
    ///
    /// Returns an error if a mapping is already tracked, the API rejects the
    /// request, or the mapping never appears in the listing.
    pub async fn create(&mut self, desired: &SamlGroupSyncSpec) -> Result<SamlGroupSync> {
        if let Some(identity) = &self.identity {
            return Err(ReconcileError::AlreadyManaged {
                kind: KIND,
                identity: identity.clone(),
            }
            .into());
        }

        self.state = LifecycleState::Creating;
        let outcome = self.create_inner(desired).await;
        self.settle();
        outcome
    }

    async fn create_inner(&mut self, desired: &SamlGroupSyncSpec) -> Result<SamlGroupSync> {
        let body = to_request(KIND, desired)?;

        info!("Creating {KIND} in {}", self.scope);
        let created: SamlGroupSync = self
            .client
            .post(&collection_path(&self.scope), &body)
            .await
            .map_err(|e| self.failure(Operation::Create, e))?;
        self.identity = Some(created.slug_perm.clone());
        info!("Created {} (slug_perm: {})", self.describe(), created.slug_perm);

        let client = self.client;
        let scope = &self.scope;
        let identity = created.slug_perm.as_str();
        wait(
            move || async move {
                match find(client, scope, identity).await {
                    Ok(Some(_)) => Check::Done,
                    Ok(None) => Check::Retry,
                    Err(e) => Check::Fatal(e),
                }
            },
            self.timeouts.create,
            &self.describe(),
            Operation::Create,
        )
        .await
        .map_err(|e| self.failure(Operation::Create, e))?;

        let target = self.target();
        self.read().await?.ok_or_else(|| {
            ReconcileError::OperationFailed {
                kind: KIND,
                target,
                operation: Operation::Create,
                source: ApiError::NotFound {
                    path: collection_path(&self.scope),
                },
                hint: None,
            }
            .into()
        })
    }

    /// Reads the mapping from the listing.
    ///
    /// A mapping that is no longer listed clears the tracked identity and
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if no mapping is tracked or any listing page fails.
    pub async fn read(&mut self) -> Result<Option<SamlGroupSync>> {
        let identity = self.require_identity()?;

        let found = find(self.client, &self.scope, &identity)
            .await
            .map_err(|e| self.failure(Operation::Read, e))?;

        if found.is_none() {
            warn!("{} is no longer listed, clearing tracked identity", self.describe());
            self.identity = None;
        }
        self.observed.clone_from(&found);
        if !self.state.is_transient() {
            self.settle();
        }
        Ok(found)
    }

    /// Replaces the mapping: delete, then create.
    ///
    /// If the create fails after the delete succeeded, the mapping is gone
    /// and the lifecycle tracks nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if either half fails.
    pub async fn update(&mut self, desired: &SamlGroupSyncSpec) -> Result<SamlGroupSync> {
        self.require_identity()?;
        warn!(
            "{} has no update endpoint; replacing it with delete + create (not atomic)",
            self.describe()
        );

        self.delete().await?;
        self.create(desired).await
    }

    /// Deletes the mapping and waits until it is no longer listed.
    ///
    /// # Errors
    ///
    /// Returns an error if no mapping is tracked, the API rejects the
    /// request, or the mapping stays listed.
    pub async fn delete(&mut self) -> Result<()> {
        let identity = self.require_identity()?;

        self.state = LifecycleState::Deleting;
        let outcome = self.delete_inner(&identity).await;
        self.settle();
        outcome
    }

    async fn delete_inner(&mut self, identity: &str) -> Result<()> {
        let path = format!("{}{identity}/", collection_path(&self.scope));

        info!("Deleting {}", self.describe());
        match self.client.delete(&path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(self.failure(Operation::Delete, e)),
        }

        let client = self.client;
        let scope = &self.scope;
        wait(
            move || async move {
                match find(client, scope, identity).await {
                    Ok(Some(_)) => Check::Retry,
                    Ok(None) => Check::Done,
                    Err(e) => Check::Fatal(e),
                }
            },
            self.timeouts.delete,
            &self.describe(),
            Operation::Delete,
        )
        .await
        .map_err(|e| self.failure(Operation::Delete, e))?;

        self.identity = None;
        self.observed = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PAGE_TOTAL_HEADER;
    use crate::reconcile::WaitPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn timeouts() -> Timeouts {
        let policy = WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(20));
        Timeouts {
            create: policy,
            update: policy,
            delete: policy,
            settle_delay: Duration::from_millis(1),
        }
    }

    fn mapping(slug_perm: &str, value: &str) -> serde_json::Value {
        json!({"slug_perm": slug_perm, "idp_key": "groups", "idp_value": value, "role": "Member", "team": "ops"})
    }

    fn listing(items: serde_json::Value, total: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header(PAGE_TOTAL_HEADER, total)
            .set_body_json(items)
    }

    #[tokio::test]
    async fn test_read_walks_every_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .and(query_param("page", "1"))
            .respond_with(listing(json!([mapping("a1", "eng")]), "2"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .and(query_param("page", "2"))
            .respond_with(listing(json!([mapping("b2", "ops")]), "2"))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let lifecycle = SamlGroupSyncLifecycle::import(&client, timeouts(), "acme.b2").await.unwrap();

        let observed = lifecycle.observed().unwrap();
        assert_eq!(observed.idp_value, "ops");
        assert_eq!(observed.organization, "acme");
        assert_eq!(lifecycle.state(), LifecycleState::Present);
    }

    #[tokio::test]
    async fn test_update_is_delete_then_create() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orgs/acme/saml-group-sync/old1/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(mapping("new2", "platform")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .respond_with(listing(json!([mapping("new2", "platform")]), "1"))
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let mut lifecycle = SamlGroupSyncLifecycle {
            identity: Some(String::from("old1")),
            state: LifecycleState::Present,
            ..SamlGroupSyncLifecycle::new(&client, timeouts(), OrgScope::new("acme"))
        };

        let observed = lifecycle
            .update(&SamlGroupSyncSpec {
                idp_key: String::from("groups"),
                idp_value: String::from("platform"),
                role: TeamRole::Member,
                team: String::from("ops"),
            })
            .await
            .unwrap();

        assert_eq!(observed.slug_perm, "new2");
        assert_eq!(lifecycle.identity(), Some("new2"));
        assert_eq!(lifecycle.state(), LifecycleState::Present);

        let requests = server.received_requests().await.unwrap();
        let delete_at = requests.iter().position(|r| r.method.as_str() == "DELETE").unwrap();
        let post_at = requests.iter().position(|r| r.method.as_str() == "POST").unwrap();
        assert!(delete_at < post_at);
    }

    #[tokio::test]
    async fn test_failed_recreate_leaves_mapping_absent() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orgs/acme/saml-group-sync/old1/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .respond_with(listing(json!([]), "1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": "team missing"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let mut lifecycle = SamlGroupSyncLifecycle {
            identity: Some(String::from("old1")),
            state: LifecycleState::Present,
            ..SamlGroupSyncLifecycle::new(&client, timeouts(), OrgScope::new("acme"))
        };

        let err = lifecycle
            .update(&SamlGroupSyncSpec {
                idp_key: String::from("groups"),
                idp_value: String::from("platform"),
                role: TeamRole::Member,
                team: String::from("ghost"),
            })
            .await
            .unwrap_err();

        match err {
            CloudsmithError::Reconcile(ReconcileError::OperationFailed {
                operation, hint, ..
            }) => {
                assert_eq!(operation, Operation::Create);
                assert!(hint.unwrap().contains("the team must exist"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);
    }

    #[tokio::test]
    async fn test_unlisted_mapping_clears_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/saml-group-sync/"))
            .respond_with(listing(json!([]), "1"))
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let mut lifecycle = SamlGroupSyncLifecycle {
            identity: Some(String::from("gone")),
            state: LifecycleState::Present,
            ..SamlGroupSyncLifecycle::new(&client, timeouts(), OrgScope::new("acme"))
        };

        assert_eq!(lifecycle.read().await.unwrap(), None);
        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);
    }
}
