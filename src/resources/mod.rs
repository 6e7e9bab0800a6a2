//! Resource catalogue.
//!
//! Most kinds are plain CRUD endpoints described by a
//! [`ResourceApi`](crate::reconcile::ResourceApi) implementation and driven
//! by the generic [`Lifecycle`]. SAML group sync and GeoIP rules lack part of
//! that surface and have their own lifecycles.

pub mod entitlement;
pub mod geoip;
pub mod license_policy;
pub mod oidc;
pub mod repository;
pub mod saml_group_sync;
pub mod team;
pub mod upstream;
pub mod vulnerability_policy;
pub mod webhook;

use async_trait::async_trait;
use clap::ValueEnum;
use serde_json::Value;
use std::fmt;

use crate::api::CloudsmithClient;
use crate::error::Result;
use crate::reconcile::managed::{decode_desired, encode_observed};
use crate::reconcile::{
    Lifecycle, LifecycleState, ManagedResource, ResourceApi, Scope, Timeouts, parse_scope_key,
};

pub use entitlement::{Entitlement, EntitlementSpec};
pub use geoip::{GeoIpLifecycle, GeoIpRules, GeoIpSpec};
pub use license_policy::{LicensePolicy, LicensePolicySpec};
pub use oidc::{Oidc, OidcSpec};
pub use repository::{Repository, RepositorySpec};
pub use saml_group_sync::{SamlGroupSync, SamlGroupSyncLifecycle, SamlGroupSyncSpec};
pub use team::{Team, TeamSpec};
pub use upstream::{Upstream, UpstreamFormat, UpstreamOptions, UpstreamScope, UpstreamSpec};
pub use vulnerability_policy::{Severity, VulnerabilityPolicy, VulnerabilityPolicySpec};
pub use webhook::{Webhook, WebhookSpec};

/// Every manageable resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Package repository.
    Repository,
    /// Organization team.
    Team,
    /// Repository entitlement token.
    Entitlement,
    /// Repository webhook.
    Webhook,
    /// Upstream proxy.
    Upstream,
    /// License policy.
    LicensePolicy,
    /// Vulnerability policy.
    VulnerabilityPolicy,
    /// OIDC provider.
    Oidc,
    /// SAML group sync mapping.
    SamlGroupSync,
    /// Repository GeoIP rules.
    GeoipRules,
}

impl ResourceKind {
    /// Kind name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Repository => Repository::KIND,
            Self::Team => Team::KIND,
            Self::Entitlement => Entitlement::KIND,
            Self::Webhook => Webhook::KIND,
            Self::Upstream => Upstream::KIND,
            Self::LicensePolicy => LicensePolicy::KIND,
            Self::VulnerabilityPolicy => VulnerabilityPolicy::KIND,
            Self::Oidc => Oidc::KIND,
            Self::SamlGroupSync => saml_group_sync::KIND,
            Self::GeoipRules => geoip::KIND,
        }
    }

    /// Import key format.
    #[must_use]
    pub const fn import_format(self) -> &'static str {
        match self {
            Self::Repository => Repository::IMPORT_FORMAT,
            Self::Team => Team::IMPORT_FORMAT,
            Self::Entitlement => Entitlement::IMPORT_FORMAT,
            Self::Webhook => Webhook::IMPORT_FORMAT,
            Self::Upstream => Upstream::IMPORT_FORMAT,
            Self::LicensePolicy => LicensePolicy::IMPORT_FORMAT,
            Self::VulnerabilityPolicy => VulnerabilityPolicy::IMPORT_FORMAT,
            Self::Oidc => Oidc::IMPORT_FORMAT,
            Self::SamlGroupSync => saml_group_sync::IMPORT_FORMAT,
            Self::GeoipRules => geoip::IMPORT_FORMAT,
        }
    }

    /// Opens an unmanaged lifecycle in the scope named by `scope_key`,
    /// ready for create.
    ///
    /// # Errors
    ///
    /// Returns an error if `scope_key` does not name a valid scope.
    pub fn open<'c>(
        self,
        client: &'c CloudsmithClient,
        timeouts: Timeouts,
        scope_key: &str,
    ) -> Result<Box<dyn ManagedResource + 'c>> {
        let resource: Box<dyn ManagedResource + 'c> = match self {
            Self::Repository => fresh::<Repository>(client, timeouts, scope_key)?,
            Self::Team => fresh::<Team>(client, timeouts, scope_key)?,
            Self::Entitlement => fresh::<Entitlement>(client, timeouts, scope_key)?,
            Self::Webhook => fresh::<Webhook>(client, timeouts, scope_key)?,
            Self::Upstream => fresh::<Upstream>(client, timeouts, scope_key)?,
            Self::LicensePolicy => fresh::<LicensePolicy>(client, timeouts, scope_key)?,
            Self::VulnerabilityPolicy => fresh::<VulnerabilityPolicy>(client, timeouts, scope_key)?,
            Self::Oidc => fresh::<Oidc>(client, timeouts, scope_key)?,
            Self::SamlGroupSync => {
                let scope = parse_scope_key(saml_group_sync::KIND, scope_key, "<organization>")?;
                Box::new(SamlGroupSyncLifecycle::new(client, timeouts, scope))
            }
            Self::GeoipRules => {
                let scope = parse_scope_key(geoip::KIND, scope_key, geoip::IMPORT_FORMAT)?;
                Box::new(GeoIpLifecycle::new(client, timeouts, scope))
            }
        };
        Ok(resource)
    }

    /// Recovers a managed lifecycle from an import key and reads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed or the object cannot be
    /// read.
    pub async fn import<'c>(
        self,
        client: &'c CloudsmithClient,
        timeouts: Timeouts,
        key: &str,
    ) -> Result<Box<dyn ManagedResource + 'c>> {
        let resource: Box<dyn ManagedResource + 'c> = match self {
            Self::Repository => Box::new(Lifecycle::<Repository>::import(client, timeouts, key).await?),
            Self::Team => Box::new(Lifecycle::<Team>::import(client, timeouts, key).await?),
            Self::Entitlement => Box::new(Lifecycle::<Entitlement>::import(client, timeouts, key).await?),
            Self::Webhook => Box::new(Lifecycle::<Webhook>::import(client, timeouts, key).await?),
            Self::Upstream => Box::new(Lifecycle::<Upstream>::import(client, timeouts, key).await?),
            Self::LicensePolicy => {
                Box::new(Lifecycle::<LicensePolicy>::import(client, timeouts, key).await?)
            }
            Self::VulnerabilityPolicy => {
                Box::new(Lifecycle::<VulnerabilityPolicy>::import(client, timeouts, key).await?)
            }
            Self::Oidc => Box::new(Lifecycle::<Oidc>::import(client, timeouts, key).await?),
            Self::SamlGroupSync => {
                Box::new(SamlGroupSyncLifecycle::import(client, timeouts, key).await?)
            }
            Self::GeoipRules => Box::new(GeoIpLifecycle::import(client, timeouts, key).await?),
        };
        Ok(resource)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn fresh<'c, R: ResourceApi>(
    client: &'c CloudsmithClient,
    timeouts: Timeouts,
    scope_key: &str,
) -> Result<Box<dyn ManagedResource + 'c>> {
    let scope: R::Scope = parse_scope_key(R::KIND, scope_key, scope_format::<R::Scope>())?;
    Ok(Box::new(Lifecycle::<R>::new(client, timeouts, scope)))
}

const fn scope_format<S: Scope>() -> &'static str {
    match S::PARTS {
        1 => "<organization>",
        2 => "<namespace>.<repository>",
        _ => "<namespace>.<repository>.<format>",
    }
}

#[async_trait]
impl<'c> ManagedResource for SamlGroupSyncLifecycle<'c> {
    fn kind(&self) -> &'static str {
        saml_group_sync::KIND
    }

    fn identity(&self) -> Option<&str> {
        SamlGroupSyncLifecycle::identity(self)
    }

    fn state(&self) -> LifecycleState {
        SamlGroupSyncLifecycle::state(self)
    }

    fn observed(&self) -> Result<Option<Value>> {
        SamlGroupSyncLifecycle::observed(self).map(encode_observed).transpose()
    }

    async fn create(&mut self, desired: Value) -> Result<Value> {
        let desired: SamlGroupSyncSpec = decode_desired(saml_group_sync::KIND, desired)?;
        encode_observed(&SamlGroupSyncLifecycle::create(self, &desired).await?)
    }

    async fn read(&mut self) -> Result<Option<Value>> {
        SamlGroupSyncLifecycle::read(self)
            .await?
            .map(|observed| encode_observed(&observed))
            .transpose()
    }

    async fn update(&mut self, desired: Value) -> Result<Value> {
        let desired: SamlGroupSyncSpec = decode_desired(saml_group_sync::KIND, desired)?;
        encode_observed(&SamlGroupSyncLifecycle::update(self, &desired).await?)
    }

    async fn delete(&mut self) -> Result<()> {
        SamlGroupSyncLifecycle::delete(self).await
    }
}

#[async_trait]
impl<'c> ManagedResource for GeoIpLifecycle<'c> {
    fn kind(&self) -> &'static str {
        geoip::KIND
    }

    fn identity(&self) -> Option<&str> {
        GeoIpLifecycle::identity(self)
    }

    fn state(&self) -> LifecycleState {
        GeoIpLifecycle::state(self)
    }

    fn observed(&self) -> Result<Option<Value>> {
        GeoIpLifecycle::observed(self).map(encode_observed).transpose()
    }

    async fn create(&mut self, desired: Value) -> Result<Value> {
        let desired: GeoIpSpec = decode_desired(geoip::KIND, desired)?;
        encode_observed(&GeoIpLifecycle::create(self, &desired).await?)
    }

    async fn read(&mut self) -> Result<Option<Value>> {
        GeoIpLifecycle::read(self)
            .await?
            .map(|observed| encode_observed(&observed))
            .transpose()
    }

    async fn update(&mut self, desired: Value) -> Result<Value> {
        let desired: GeoIpSpec = decode_desired(geoip::KIND, desired)?;
        encode_observed(&GeoIpLifecycle::update(self, &desired).await?)
    }

    async fn delete(&mut self) -> Result<()> {
        GeoIpLifecycle::delete(self).await
    }
}
