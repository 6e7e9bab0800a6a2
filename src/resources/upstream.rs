//! Upstream proxies.
//!
//! Each repository can proxy and cache several upstream sources per package
//! format. Most formats share one request shape; Debian and RPM upstreams
//! add distribution fields. The format is part of the scope, so the request
//! builder is chosen once when the scope is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ApiError, ReconcileError, Result};
use crate::reconcile::{
    Operation, ResourceApi, Scope, UpdateConvergence, UpdateMethod, to_request,
};

/// Package format an upstream serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamFormat {
    /// CRAN (R).
    Cran,
    /// Dart / Flutter.
    Dart,
    /// Debian.
    Deb,
    /// Docker / OCI.
    Docker,
    /// Helm charts.
    Helm,
    /// Maven.
    Maven,
    /// npm.
    Npm,
    /// NuGet.
    Nuget,
    /// Python (PyPI).
    Python,
    /// RPM.
    Rpm,
    /// Ruby gems.
    Ruby,
    /// Swift packages.
    Swift,
}

impl UpstreamFormat {
    /// Every supported format.
    pub const ALL: [Self; 12] = [
        Self::Cran,
        Self::Dart,
        Self::Deb,
        Self::Docker,
        Self::Helm,
        Self::Maven,
        Self::Npm,
        Self::Nuget,
        Self::Python,
        Self::Rpm,
        Self::Ruby,
        Self::Swift,
    ];

    /// Path segment used by the API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cran => "cran",
            Self::Dart => "dart",
            Self::Deb => "deb",
            Self::Docker => "docker",
            Self::Helm => "helm",
            Self::Maven => "maven",
            Self::Npm => "npm",
            Self::Nuget => "nuget",
            Self::Python => "python",
            Self::Rpm => "rpm",
            Self::Ruby => "ruby",
            Self::Swift => "swift",
        }
    }

    /// Request builder for this format.
    #[must_use]
    pub const fn builder(self) -> RequestBuilder {
        match self {
            Self::Deb => RequestBuilder::Deb,
            Self::Rpm => RequestBuilder::Rpm,
            _ => RequestBuilder::Standard,
        }
    }
}

impl fmt::Display for UpstreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("unknown upstream format '{s}'"))
    }
}

/// Scope of an upstream: repository plus format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpstreamScope {
    /// Owning namespace.
    pub namespace: String,
    /// Repository slug.
    pub repository: String,
    /// Package format.
    pub format: UpstreamFormat,
}

impl UpstreamScope {
    /// Creates an upstream scope.
    #[must_use]
    pub fn new(namespace: impl Into<String>, repository: impl Into<String>, format: UpstreamFormat) -> Self {
        Self {
            namespace: namespace.into(),
            repository: repository.into(),
            format,
        }
    }
}

impl Scope for UpstreamScope {
    const PARTS: usize = 3;

    fn from_parts(parts: &[&str]) -> Option<Self> {
        match parts {
            [namespace, repository, format] => {
                let format = format.parse().ok()?;
                Some(Self::new(*namespace, *repository, format))
            }
            _ => None,
        }
    }
}

impl fmt::Display for UpstreamScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.repository, self.format)
    }
}

/// Desired upstream configuration.
///
/// Distribution fields apply only to Debian and RPM upstreams.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSpec {
    /// Display name.
    pub name: String,
    /// Source URL.
    pub upstream_url: String,
    /// `Proxy Only` or `Cache and Proxy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Resolution priority; lower wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// Whether the upstream is consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Whether TLS certificates are verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_ssl: Option<bool>,
    /// `None` or `Username and Password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<String>,
    /// Basic auth username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_username: Option<String>,
    /// Basic auth secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,
    /// Debian: distributions to proxy, such as `ubuntu/jammy`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distro_versions: Vec<String>,
    /// Debian: component, such as `main`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Debian: upstream distribution name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_distribution: Option<String>,
    /// RPM: distribution version, such as `el/9`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro_version: Option<String>,
    /// Debian and RPM: whether source packages are proxied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_sources: Option<bool>,
}

/// Format-specific request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBuilder {
    /// Debian upstreams.
    Deb,
    /// RPM upstreams.
    Rpm,
    /// Every other format.
    Standard,
}

impl RequestBuilder {
    /// Builds the create/update body for `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidDesiredState`] if required
    /// format fields are missing or fields of another format are set.
    pub fn build(self, desired: &UpstreamSpec) -> Result<serde_json::Value> {
        if desired.upstream_url.trim().is_empty() {
            return Err(invalid("upstream_url is required"));
        }

        let deb_fields = !desired.distro_versions.is_empty()
            || desired.component.is_some()
            || desired.upstream_distribution.is_some();

        match self {
            Self::Deb => {
                if desired.distro_versions.is_empty() {
                    return Err(invalid("deb upstreams require distro_versions"));
                }
                if desired.distro_version.is_some() {
                    return Err(invalid("distro_version applies to rpm upstreams only"));
                }
            }
            Self::Rpm => {
                if desired.distro_version.is_none() {
                    return Err(invalid("rpm upstreams require distro_version"));
                }
                if deb_fields {
                    return Err(invalid("distro_versions, component and upstream_distribution apply to deb upstreams only"));
                }
            }
            Self::Standard => {
                if deb_fields || desired.distro_version.is_some() || desired.include_sources.is_some() {
                    return Err(invalid("distribution fields apply to deb and rpm upstreams only"));
                }
            }
        }

        to_request(Upstream::KIND, desired)
    }
}

fn invalid(message: &str) -> crate::error::CloudsmithError {
    ReconcileError::InvalidDesiredState {
        kind: Upstream::KIND,
        message: message.to_string(),
    }
    .into()
}

/// Format-specific observed options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UpstreamOptions {
    /// Debian distribution settings.
    Deb {
        /// Proxied distributions.
        distro_versions: Vec<String>,
        /// Component.
        component: Option<String>,
        /// Upstream distribution name.
        upstream_distribution: Option<String>,
        /// Whether source packages are proxied.
        include_sources: bool,
    },
    /// RPM distribution settings.
    Rpm {
        /// Distribution version.
        distro_version: Option<String>,
        /// Whether source packages are proxied.
        include_sources: bool,
    },
    /// No format-specific settings.
    Standard,
}

/// Raw upstream response body; the union of every format's fields.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamPayload {
    slug_perm: String,
    name: String,
    upstream_url: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    priority: Option<u32>,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    verify_ssl: Option<bool>,
    #[serde(default)]
    auth_mode: Option<String>,
    #[serde(default)]
    auth_username: Option<String>,
    #[serde(default)]
    distro_versions: Vec<String>,
    #[serde(default)]
    component: Option<String>,
    #[serde(default)]
    upstream_distribution: Option<String>,
    #[serde(default)]
    distro_version: Option<String>,
    #[serde(default)]
    include_sources: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Normalized upstream, whatever its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upstream {
    /// Owning namespace; restored from scope.
    pub namespace: String,
    /// Repository; restored from scope.
    pub repository: String,
    /// Package format; restored from scope.
    pub format: UpstreamFormat,
    /// Permanent identifier.
    pub slug_perm: String,
    /// Display name.
    pub name: String,
    /// Source URL.
    pub upstream_url: String,
    /// Proxy mode.
    pub mode: Option<String>,
    /// Resolution priority.
    pub priority: Option<u32>,
    /// Whether the upstream is consulted.
    pub is_active: bool,
    /// Whether TLS certificates are verified.
    pub verify_ssl: Option<bool>,
    /// Authentication mode.
    pub auth_mode: Option<String>,
    /// Basic auth username.
    pub auth_username: Option<String>,
    /// Format-specific options.
    pub options: UpstreamOptions,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceApi for Upstream {
    const KIND: &'static str = "upstream";
    const IMPORT_FORMAT: &'static str = "<namespace>.<repository>.<format>.<slug_perm>";
    const UPDATE_METHOD: UpdateMethod = UpdateMethod::Put;
    const UPDATE_CONVERGENCE: UpdateConvergence = UpdateConvergence::FixedDelay;

    type Scope = UpstreamScope;
    type Desired = UpstreamSpec;
    type Payload = UpstreamPayload;
    type Observed = Self;

    fn collection_path(scope: &UpstreamScope) -> String {
        format!(
            "/repos/{}/{}/upstream/{}/",
            scope.namespace, scope.repository, scope.format
        )
    }

    fn create_request(scope: &UpstreamScope, desired: &UpstreamSpec) -> Result<serde_json::Value> {
        scope.format.builder().build(desired)
    }

    fn observe(payload: UpstreamPayload, scope: &UpstreamScope) -> Self {
        let options = match scope.format.builder() {
            RequestBuilder::Deb => UpstreamOptions::Deb {
                distro_versions: payload.distro_versions,
                component: payload.component,
                upstream_distribution: payload.upstream_distribution,
                include_sources: payload.include_sources,
            },
            RequestBuilder::Rpm => UpstreamOptions::Rpm {
                distro_version: payload.distro_version,
                include_sources: payload.include_sources,
            },
            RequestBuilder::Standard => UpstreamOptions::Standard,
        };

        Self {
            namespace: scope.namespace.clone(),
            repository: scope.repository.clone(),
            format: scope.format,
            slug_perm: payload.slug_perm,
            name: payload.name,
            upstream_url: payload.upstream_url,
            mode: payload.mode,
            priority: payload.priority,
            is_active: payload.is_active,
            verify_ssl: payload.verify_ssl,
            auth_mode: payload.auth_mode,
            auth_username: payload.auth_username,
            options,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
        }
    }

    fn identity(observed: &Self) -> &str {
        &observed.slug_perm
    }

    fn updated_at(observed: &Self) -> Option<DateTime<Utc>> {
        observed.updated_at
    }

    fn rejection_hint(_operation: Operation, error: &ApiError) -> Option<String> {
        matches!(error, ApiError::Unprocessable { .. }).then(|| {
            String::from("check the format-specific fields and that upstream_url is reachable")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::parse_import_key;
    use serde_json::json;

    fn spec() -> UpstreamSpec {
        UpstreamSpec {
            name: String::from("mirror"),
            upstream_url: String::from("https://mirror.example.com"),
            ..UpstreamSpec::default()
        }
    }

    #[test]
    fn test_import_key_has_four_parts() {
        let (scope, identity) = parse_import_key::<UpstreamScope>(
            Upstream::KIND,
            "acme.my-repo.deb.Up1",
            Upstream::IMPORT_FORMAT,
        )
        .unwrap();

        assert_eq!(scope, UpstreamScope::new("acme", "my-repo", UpstreamFormat::Deb));
        assert_eq!(identity, "Up1");
        assert_eq!(scope.to_string(), "acme/my-repo/deb");
        assert_eq!(
            Upstream::item_path(&scope, &identity),
            "/repos/acme/my-repo/upstream/deb/Up1/"
        );

        assert!(
            parse_import_key::<UpstreamScope>(Upstream::KIND, "acme.my-repo.cobol.Up1", Upstream::IMPORT_FORMAT)
                .is_err()
        );
    }

    #[test]
    fn test_builder_selected_by_format() {
        assert_eq!(UpstreamFormat::Deb.builder(), RequestBuilder::Deb);
        assert_eq!(UpstreamFormat::Rpm.builder(), RequestBuilder::Rpm);
        assert_eq!(UpstreamFormat::Npm.builder(), RequestBuilder::Standard);
        assert_eq!("python".parse::<UpstreamFormat>().unwrap(), UpstreamFormat::Python);
    }

    #[test]
    fn test_format_specific_validation() {
        let mut deb = spec();
        assert!(RequestBuilder::Deb.build(&deb).is_err());
        deb.distro_versions = vec![String::from("ubuntu/jammy")];
        deb.component = Some(String::from("main"));
        assert!(RequestBuilder::Deb.build(&deb).is_ok());
        assert!(RequestBuilder::Standard.build(&deb).is_err());

        let mut rpm = spec();
        assert!(RequestBuilder::Rpm.build(&rpm).is_err());
        rpm.distro_version = Some(String::from("el/9"));
        rpm.include_sources = Some(true);
        let body = RequestBuilder::Rpm.build(&rpm).unwrap();
        assert_eq!(body["distro_version"], "el/9");
        assert!(body.get("distro_versions").is_none());

        assert!(RequestBuilder::Standard.build(&spec()).is_ok());
    }

    #[test]
    fn test_observe_normalizes_options() {
        let payload: UpstreamPayload = serde_json::from_value(json!({
            "slug_perm": "Up1",
            "name": "ubuntu",
            "upstream_url": "http://archive.ubuntu.com/ubuntu",
            "is_active": true,
            "distro_versions": ["ubuntu/jammy"],
            "component": "main",
            "include_sources": false
        }))
        .unwrap();

        let observed = Upstream::observe(
            payload.clone(),
            &UpstreamScope::new("acme", "mirror", UpstreamFormat::Deb),
        );
        assert_eq!(observed.format, UpstreamFormat::Deb);
        assert_eq!(
            observed.options,
            UpstreamOptions::Deb {
                distro_versions: vec![String::from("ubuntu/jammy")],
                component: Some(String::from("main")),
                upstream_distribution: None,
                include_sources: false,
            }
        );

        let generic = Upstream::observe(
            payload,
            &UpstreamScope::new("acme", "mirror", UpstreamFormat::Python),
        );
        assert_eq!(generic.options, UpstreamOptions::Standard);
        assert_eq!(
            serde_json::to_value(&generic.options).unwrap(),
            json!({"kind": "standard"})
        );
    }
}
