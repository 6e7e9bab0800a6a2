//! GeoIP access rules for a repository.
//!
//! The rules are a per-repository setting rather than an object: there is
//! no create or delete endpoint. Create enables the feature and then applies
//! the rules; delete resets them to empty lists and leaves the (now empty)
//! configuration in place on the server.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::CloudsmithClient;
use crate::error::{ApiError, CloudsmithError, ReconcileError, Result};
use crate::reconcile::{
    Check, LifecycleState, Operation, RepoScope, Timeouts, parse_scope_key, wait,
};

/// Kind name.
pub const KIND: &str = "geoip_rules";

/// Import key format.
pub const IMPORT_FORMAT: &str = "<namespace>.<repository>";

/// Desired GeoIP rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoIpSpec {
    /// CIDR ranges allowed.
    #[serde(default)]
    pub cidr_allow: Vec<String>,
    /// CIDR ranges denied.
    #[serde(default)]
    pub cidr_deny: Vec<String>,
    /// ISO 3166-1 alpha-2 country codes allowed.
    #[serde(default)]
    pub country_code_allow: Vec<String>,
    /// ISO 3166-1 alpha-2 country codes denied.
    #[serde(default)]
    pub country_code_deny: Vec<String>,
}

impl GeoIpSpec {
    /// Sorted, deduplicated copy with upper-cased country codes.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn tidy(values: &[String], upper: bool) -> Vec<String> {
            let mut out: Vec<String> = values
                .iter()
                .map(|v| if upper { v.trim().to_uppercase() } else { v.trim().to_string() })
                .collect();
            out.sort();
            out.dedup();
            out
        }

        Self {
            cidr_allow: tidy(&self.cidr_allow, false),
            cidr_deny: tidy(&self.cidr_deny, false),
            country_code_allow: tidy(&self.country_code_allow, true),
            country_code_deny: tidy(&self.country_code_deny, true),
        }
    }

    /// Normalized copy with every CIDR rewritten as `network/prefix`.
    ///
    /// The server may store `10.0.0.1/8` as `10.0.0.0/8`, so written and
    /// read-back rules are compared in this form.
    #[must_use]
    pub fn canonical(&self) -> Self {
        fn canonicalize(values: &[String]) -> Vec<String> {
            let mut out: Vec<String> = values.iter().map(|v| canonical_cidr(v)).collect();
            out.sort();
            out.dedup();
            out
        }

        let normalized = self.normalized();
        Self {
            cidr_allow: canonicalize(&normalized.cidr_allow),
            cidr_deny: canonicalize(&normalized.cidr_deny),
            ..normalized
        }
    }

    /// Returns true if no rule is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cidr_allow.is_empty()
            && self.cidr_deny.is_empty()
            && self.country_code_allow.is_empty()
            && self.country_code_deny.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let bad_code = self
            .country_code_allow
            .iter()
            .chain(&self.country_code_deny)
            .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()));
        if let Some(code) = bad_code {
            return Err(ReconcileError::InvalidDesiredState {
                kind: KIND,
                message: format!("'{code}' is not a two-letter country code"),
            }
            .into());
        }
        Ok(())
    }

    fn to_body(&self) -> GeoIpBody {
        GeoIpBody {
            cidr: AllowDeny {
                allow: self.cidr_allow.clone(),
                deny: self.cidr_deny.clone(),
            },
            country_code: AllowDeny {
                allow: self.country_code_allow.clone(),
                deny: self.country_code_deny.clone(),
            },
        }
    }
}

/// Masks the host bits of a CIDR range. A bare address gets a full-length
/// prefix. Anything unparseable is returned trimmed.
fn canonical_cidr(value: &str) -> String {
    let value = value.trim();
    let (address, prefix) = match value.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (value, None),
    };
    let Ok(address) = address.parse::<IpAddr>() else {
        return value.to_string();
    };

    let max: u32 = if address.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix.map(str::parse::<u32>) {
        None => max,
        Some(Ok(prefix)) if prefix <= max => prefix,
        Some(_) => return value.to_string(),
    };

    let network = match address {
        IpAddr::V4(v4) => {
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    };
    format!("{network}/{prefix}")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AllowDeny {
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    deny: Vec<String>,
}

/// Wire shape of the rules, for both GET and PUT.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GeoIpBody {
    #[serde(default)]
    cidr: AllowDeny,
    #[serde(default)]
    country_code: AllowDeny,
}

impl GeoIpBody {
    fn into_spec(self) -> GeoIpSpec {
        GeoIpSpec {
            cidr_allow: self.cidr.allow,
            cidr_deny: self.cidr.deny,
            country_code_allow: self.country_code.allow,
            country_code_deny: self.country_code.deny,
        }
        .normalized()
    }
}

/// Observed GeoIP rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoIpRules {
    /// Owning namespace.
    pub namespace: String,
    /// Repository.
    pub repository: String,
    /// Normalized rules.
    #[serde(flatten)]
    pub rules: GeoIpSpec,
}

fn rules_path(scope: &RepoScope) -> String {
    format!("/repos/{}/{}/geoip", scope.namespace, scope.repository)
}

async fn fetch(client: &CloudsmithClient, scope: &RepoScope) -> Result<GeoIpSpec> {
    let body: GeoIpBody = client.get(&rules_path(scope)).await?;
    Ok(body.into_spec())
}

/// Lifecycle for the GeoIP rules of one repository.
#[derive(Debug)]
pub struct GeoIpLifecycle<'c> {
    client: &'c CloudsmithClient,
    timeouts: Timeouts,
    scope: RepoScope,
    identity: Option<String>,
    observed: Option<GeoIpRules>,
    state: LifecycleState,
}

impl<'c> GeoIpLifecycle<'c> {
    /// Creates a lifecycle with unmanaged rules.
    #[must_use]
    pub const fn new(client: &'c CloudsmithClient, timeouts: Timeouts, scope: RepoScope) -> Self {
        Self {
            client,
            timeouts,
            scope,
            identity: None,
            observed: None,
            state: LifecycleState::Absent,
        }
    }

    /// Takes over the rules of `<namespace>.<repository>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed or the repository does not
    /// exist.
    pub async fn import(client: &'c CloudsmithClient, timeouts: Timeouts, key: &str) -> Result<Self> {
        let scope = parse_scope_key::<RepoScope>(KIND, key, IMPORT_FORMAT)?;
        let path = rules_path(&scope);
        let mut lifecycle = Self::new(client, timeouts, scope);
        lifecycle.identity = Some(lifecycle.synthesized_identity());
        lifecycle.state = LifecycleState::Present;

        info!("Importing {KIND} for {}", lifecycle.scope);
        match lifecycle.read().await? {
            Some(_) => Ok(lifecycle),
            None => Err(ReconcileError::OperationFailed {
                kind: KIND,
                target: lifecycle.scope.to_string(),
                operation: Operation::Import,
                source: ApiError::NotFound { path },
                hint: Some(String::from("the repository does not exist")),
            }
            .into()),
        }
    }

    /// Tracked identity, `<namespace>.<repository>` while managed.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Last observed rules.
    #[must_use]
    pub const fn observed(&self) -> Option<&GeoIpRules> {
        self.observed.as_ref()
    }

    fn synthesized_identity(&self) -> String {
        format!("{}.{}", self.scope.namespace, self.scope.repository)
    }

    fn describe(&self) -> String {
        format!("{KIND} {}", self.scope)
    }

    fn require_identity(&self) -> Result<()> {
        if self.identity.is_some() {
            Ok(())
        } else {
            Err(ReconcileError::NotManaged {
                kind: KIND,
                scope: self.scope.to_string(),
            }
            .into())
        }
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
                | ApiError::NotFound { .. }
                | ApiError::InvalidResponse { .. }),
            ) => {
                let hint = matches!(source, ApiError::Unprocessable { .. })
                    .then(|| String::from("check that every cidr entry is a valid IPv4 or IPv6 range"));
                ReconcileError::OperationFailed {
                    kind: KIND,
                    target: self.scope.to_string(),
                    operation,
                    source,
                    hint,
                }
                .into()
            }
            other => other,
        }
    }

    /// Writes `desired` and waits until a read returns the same rules,
    /// compared in canonical CIDR form.
    async fn apply(&self, desired: &GeoIpSpec, operation: Operation) -> Result<()> {
        let desired = desired.normalized();
        desired.validate()?;

        self.client
            .put_no_content(&rules_path(&self.scope), &desired.to_body())
            .await
            .map_err(|e| self.failure(operation, e))?;

        let client = self.client;
        let scope = &self.scope;
        let expected = &desired.canonical();
        wait(
            move || async move {
                match fetch(client, scope).await {
                    Ok(rules) if rules.canonical() == *expected => Check::Done,
                    Ok(_) => Check::Retry,
                    Err(e) => Check::Fatal(e),
                }
            },
            self.timeouts.for_operation(operation),
            &self.describe(),
            operation,
        )
        .await
        .map_err(|e| self.failure(operation, e))
    }

    /// Enables GeoIP filtering and applies `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules are already managed, a request fails,
    /// or the rules never read back as written.
    pub async fn create(&mut self, desired: &GeoIpSpec) -> Result<GeoIpRules> {
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

    async fn create_inner(&mut self, desired: &GeoIpSpec) -> Result<GeoIpRules> {
        desired.normalized().validate()?;

        info!("Enabling GeoIP rules for {}", self.scope);
        self.client
            .post_empty(&format!("{}/enable", rules_path(&self.scope)))
            .await
            .map_err(|e| self.failure(Operation::Create, e))?;
        self.identity = Some(self.synthesized_identity());

        self.apply(desired, Operation::Create).await?;
        self.read_applied(Operation::Create).await
    }

    /// Reads the current rules.
    ///
    /// The rules are addressable whenever the repository exists, so this
    /// works whether or not they are managed. A 404 means the repository is
    /// gone: the identity is cleared and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than 404.
    pub async fn read(&mut self) -> Result<Option<GeoIpRules>> {
        match fetch(self.client, &self.scope).await {
            Ok(rules) => {
                let observed = GeoIpRules {
                    namespace: self.scope.namespace.clone(),
                    repository: self.scope.repository.clone(),
                    rules,
                };
                self.observed = Some(observed.clone());
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

    async fn read_applied(&mut self, operation: Operation) -> Result<GeoIpRules> {
        let path = rules_path(&self.scope);
        self.read().await?.ok_or_else(|| {
            ReconcileError::OperationFailed {
                kind: KIND,
                target: self.scope.to_string(),
                operation,
                source: ApiError::NotFound { path },
                hint: None,
            }
            .into()
        })
    }

    /// Replaces the rules with `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules are not managed, a request fails, or
    /// the rules never read back as written.
    pub async fn update(&mut self, desired: &GeoIpSpec) -> Result<GeoIpRules> {
        self.require_identity()?;

        self.state = LifecycleState::Updating;
        info!("Updating {}", self.describe());
        let outcome = match self.apply(desired, Operation::Update).await {
            Ok(()) => self.read_applied(Operation::Update).await,
            Err(e) => Err(e),
        };
        self.settle();
        outcome
    }

    /// Resets the rules to empty lists and stops managing them.
    ///
    /// Nothing is removed server-side: a later read returns the empty
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules are not managed, the reset is rejected,
    /// or the empty rules never read back.
    pub async fn delete(&mut self) -> Result<()> {
        self.require_identity()?;

        warn!(
            "{} has no delete endpoint; resetting to empty rules, the configuration record remains",
            self.describe()
        );
        self.state = LifecycleState::Deleting;
        let outcome = self.apply(&GeoIpSpec::default(), Operation::Delete).await;
        if outcome.is_ok() {
            self.identity = None;
            self.observed = None;
        }
        self.settle();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::WaitPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
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

    fn empty_rules() -> serde_json::Value {
        json!({"cidr": {"allow": [], "deny": []}, "country_code": {"allow": [], "deny": []}})
    }

    #[test]
    fn test_normalization() {
        let spec = GeoIpSpec {
            cidr_allow: vec![String::from("10.0.0.0/8"), String::from(" 10.0.0.0/8"), String::from("192.168.0.0/16")],
            country_code_deny: vec![String::from("ru"), String::from("KP")],
            ..GeoIpSpec::default()
        };

        let normalized = spec.normalized();
        assert_eq!(normalized.cidr_allow, vec!["10.0.0.0/8", "192.168.0.0/16"]);
        assert_eq!(normalized.country_code_deny, vec!["KP", "RU"]);
        assert!(!normalized.is_empty());
        assert!(GeoIpSpec::default().is_empty());
    }

    #[test]
    fn test_canonical_cidrs() {
        let spec = GeoIpSpec {
            cidr_allow: vec![
                String::from("10.0.0.1/8"),
                String::from("10.0.0.0/8"),
                String::from("192.168.1.7"),
            ],
            cidr_deny: vec![
                String::from("2001:DB8::1/32"),
                String::from("0.0.0.0/0"),
                String::from("not-a-range"),
            ],
            ..GeoIpSpec::default()
        };

        let canonical = spec.canonical();
        assert_eq!(canonical.cidr_allow, vec!["10.0.0.0/8", "192.168.1.7/32"]);
        assert_eq!(canonical.cidr_deny, vec!["0.0.0.0/0", "2001:db8::/32", "not-a-range"]);
    }

    #[test]
    fn test_bad_country_code_rejected() {
        let spec = GeoIpSpec {
            country_code_allow: vec![String::from("USA")],
            ..GeoIpSpec::default()
        };
        assert!(spec.normalized().validate().is_err());
    }

    #[tokio::test]
    async fn test_create_enables_then_applies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/web/geoip/enable"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/acme/web/geoip"))
            .and(body_json(json!({
                "cidr": {"allow": ["10.0.0.0/8"], "deny": []},
                "country_code": {"allow": [], "deny": ["KP", "RU"]}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/web/geoip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cidr": {"allow": ["10.0.0.0/8"], "deny": []},
                "country_code": {"allow": [], "deny": ["RU", "KP"]}
            })))
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let mut lifecycle = GeoIpLifecycle::new(&client, timeouts(), RepoScope::new("acme", "web"));

        let observed = lifecycle
            .create(&GeoIpSpec {
                cidr_allow: vec![String::from("10.0.0.0/8")],
                country_code_deny: vec![String::from("ru"), String::from("kp")],
                ..GeoIpSpec::default()
            })
            .await
            .unwrap();

        assert_eq!(observed.rules.country_code_deny, vec!["KP", "RU"]);
        assert_eq!(lifecycle.identity(), Some("acme.web"));
        assert_eq!(lifecycle.state(), LifecycleState::Present);
    }

    #[tokio::test]
    async fn test_update_converges_when_server_masks_host_bits() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/acme/web/geoip"))
            .and(body_json(json!({
                "cidr": {"allow": ["10.0.0.1/8"], "deny": []},
                "country_code": {"allow": [], "deny": []}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/web/geoip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cidr": {"allow": ["10.0.0.0/8"], "deny": []},
                "country_code": {"allow": [], "deny": []}
            })))
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let mut lifecycle = GeoIpLifecycle::import(&client, timeouts(), "acme.web").await.unwrap();

        let observed = lifecycle
            .update(&GeoIpSpec {
                cidr_allow: vec![String::from("10.0.0.1/8")],
                ..GeoIpSpec::default()
            })
            .await
            .unwrap();

        assert_eq!(observed.rules.cidr_allow, vec!["10.0.0.0/8"]);
        assert_eq!(lifecycle.state(), LifecycleState::Present);
    }

    #[tokio::test]
    async fn test_delete_then_read_returns_empty_configuration() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/acme/web/geoip"))
            .and(body_json(empty_rules()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/web/geoip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_rules()))
            .mount(&server)
            .await;

        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());
        let mut lifecycle = GeoIpLifecycle::import(&client, timeouts(), "acme.web").await.unwrap();

        lifecycle.delete().await.unwrap();
        assert_eq!(lifecycle.identity(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Absent);

        let after = lifecycle.read().await.unwrap().unwrap();
        assert!(after.rules.is_empty());
        assert_eq!(after.namespace, "acme");
        assert_eq!(lifecycle.state(), LifecycleState::Absent);
    }

    #[tokio::test]
    async fn test_import_key_is_scope_only() {
        let server = MockServer::start().await;
        let client = CloudsmithClient::new("k").unwrap().with_base_url(server.uri());

        let err = GeoIpLifecycle::import(&client, timeouts(), "acme.web.extra")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudsmithError::Reconcile(ReconcileError::InvalidImportId { expected: 2, found: 3, .. })
        ));
    }
}
