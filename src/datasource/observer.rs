//! Registry observer for read-only lookups.
//!
//! Listing lookups run through the [`Pager`] so that every page is fetched
//! with the same filters and the result is all-or-nothing.

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::{CloudsmithClient, ListFilter};
use crate::error::Result;
use crate::reconcile::Pager;
use crate::resources::Entitlement;

use super::types::{EntitlementQuery, Namespace, OrgMember, Package, PackageQuery};

/// Sort applied in most-recent mode when none is given.
pub const MOST_RECENT_SORT: &str = "-date";

/// Read-only view over registry listings.
#[derive(Debug)]
pub struct RegistryObserver<'c> {
    /// Cloudsmith API client.
    client: &'c CloudsmithClient,
}

impl<'c> RegistryObserver<'c> {
    /// Creates a new observer.
    #[must_use]
    pub const fn new(client: &'c CloudsmithClient) -> Self {
        Self { client }
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        pager: Pager,
        filter: &ListFilter,
    ) -> Result<Vec<T>> {
        let client = self.client;
        pager
            .fetch_all(move |request| client.list_page(path, request, filter))
            .await
    }

    /// Lists packages in a repository.
    ///
    /// In most-recent mode a single item is fetched (one page of size one),
    /// sorted by `-date` unless another sort is given.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn packages(
        &self,
        namespace: &str,
        repository: &str,
        query: &PackageQuery,
    ) -> Result<Vec<Package>> {
        info!("Listing packages in {namespace}/{repository}");

        let (pager, sort) = if query.most_recent {
            (
                Pager::new(1, 1),
                query.sort.as_deref().or(Some(MOST_RECENT_SORT)),
            )
        } else {
            (
                Pager::new(query.page_size, query.page_count),
                query.sort.as_deref(),
            )
        };

        let filter = ListFilter::new().query(query.query.as_deref()).sort(sort);
        let packages: Vec<Package> = self
            .list(&format!("/packages/{namespace}/{repository}/"), pager, &filter)
            .await?;

        debug!("Found {} packages", packages.len());
        Ok(packages)
    }

    /// Lists organization members.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn org_members(&self, organization: &str, is_active: Option<bool>) -> Result<Vec<OrgMember>> {
        info!("Listing members of {organization}");

        let filter = ListFilter::new().flag("is_active", is_active);
        let members: Vec<OrgMember> = self
            .list(&format!("/orgs/{organization}/members/"), Pager::all(), &filter)
            .await?;

        debug!("Found {} members", members.len());
        Ok(members)
    }

    /// Lists entitlement tokens of a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn entitlement_tokens(
        &self,
        namespace: &str,
        repository: &str,
        query: &EntitlementQuery,
    ) -> Result<Vec<Entitlement>> {
        info!("Listing entitlement tokens in {namespace}/{repository}");

        let filter = ListFilter::new()
            .query(query.query.as_deref())
            .flag("active", query.active)
            .flag("show_tokens", Some(query.show_tokens));
        let mut tokens: Vec<Entitlement> = self
            .list(&format!("/entitlements/{namespace}/{repository}/"), Pager::all(), &filter)
            .await?;

        for token in &mut tokens {
            token.namespace = namespace.to_string();
            token.repository = repository.to_string();
        }

        debug!("Found {} entitlement tokens", tokens.len());
        Ok(tokens)
    }

    /// Looks up a namespace by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace does not exist or the request fails.
    pub async fn namespace(&self, slug: &str) -> Result<Namespace> {
        debug!("Getting namespace: {slug}");
        self.client.get(&format!("/namespaces/{slug}/")).await
    }
}
