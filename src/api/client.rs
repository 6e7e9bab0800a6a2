//! Cloudsmith API client implementation.
//!
//! One method call is one HTTP request. The client never retries: the only
//! retry loop in the crate is the convergence waiter, and it only retries on
//! an explicit "keep waiting" signal.

use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::{ConfigParser, DEFAULT_API_HOST, ProviderConfig};
use crate::error::{ApiError, CloudsmithError, Result};

use super::types::{ListFilter, Page, PageRequest, UserSelf, describe_error_body};

/// Response header carrying the total page count of a listing.
pub const PAGE_TOTAL_HEADER: &str = "X-Pagination-Pagetotal";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fallback when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Cloudsmith API client.
///
/// Built once at startup and passed by reference to every lifecycle and
/// listing call.
#[derive(Debug, Clone)]
pub struct CloudsmithClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// API key sent as a bearer token.
    api_key: String,
}

impl CloudsmithClient {
    /// Creates a client against the public API with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(concat!("cloudsmith-reconcile/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: String::from(DEFAULT_API_HOST),
            api_key: api_key.to_string(),
        })
    }

    /// Creates a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client
    /// cannot be created.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = ConfigParser::api_key(config)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            api_key,
        })
    }

    /// Points the client at a different API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends one request and maps non-2xx statuses onto [`ApiError`].
    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("Request to {path} failed: {e}")))?;

        let status = response.status();
        trace!("{path} -> {status}");

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into());
        }

        let body = response.text().await.unwrap_or_default();
        let message = describe_error_body(&body);

        let err = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::AuthenticationFailed {
                message: if message.is_empty() {
                    String::from("Invalid API key")
                } else {
                    message
                },
            },
            StatusCode::NOT_FOUND => ApiError::NotFound {
                path: path.to_string(),
            },
            StatusCode::UNPROCESSABLE_ENTITY => ApiError::Unprocessable { message },
            _ => ApiError::request_failed(status.as_u16(), message),
        };

        Err(err.into())
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            CloudsmithError::Api(ApiError::invalid_response(format!(
                "Failed to decode response from {path}: {e}"
            )))
        })
    }

    /// Fetches and decodes a single object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {path}");
        let response = self.send(self.client.get(self.url(path)), path).await?;
        Self::decode(response, path).await
    }

    /// Creates an object and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {path}");
        let response = self
            .send(self.client.post(self.url(path)).json(body), path)
            .await?;
        Self::decode(response, path).await
    }

    /// Posts without a body and ignores the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        debug!("POST {path} (no body)");
        self.send(self.client.post(self.url(path)), path).await?;
        Ok(())
    }

    /// Partially updates an object and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PATCH {path}");
        let response = self
            .send(self.client.patch(self.url(path)).json(body), path)
            .await?;
        Self::decode(response, path).await
    }

    /// Replaces an object and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PUT {path}");
        let response = self
            .send(self.client.put(self.url(path)).json(body), path)
            .await?;
        Self::decode(response, path).await
    }

    /// Replaces an object and ignores the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn put_no_content<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        debug!("PUT {path} (response ignored)");
        self.send(self.client.put(self.url(path)).json(body), path)
            .await?;
        Ok(())
    }

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, including 404.
    pub async fn delete(&self, path: &str) -> Result<()> {
        debug!("DELETE {path}");
        self.send(self.client.delete(self.url(path)), path).await?;
        Ok(())
    }

    /// Fetches one page of a listing endpoint.
    ///
    /// The body must be a JSON array and the response must carry
    /// [`PAGE_TOTAL_HEADER`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the body cannot be decoded, or
    /// the page total header is missing or malformed.
    pub async fn list_page<T: DeserializeOwned>(
        &self,
        path: &str,
        request: PageRequest,
        filter: &ListFilter,
    ) -> Result<Page<T>> {
        debug!(
            "GET {path} page={} page_size={}",
            request.page, request.page_size
        );

        let builder = self
            .client
            .get(self.url(path))
            .query(&[
                ("page", request.page.to_string()),
                ("page_size", request.page_size.to_string()),
            ])
            .query(filter.params());

        let response = self.send(builder, path).await?;
        let total_pages = parse_page_total(response.headers())?;
        let items: Vec<T> = Self::decode(response, path).await?;

        Ok(Page { items, total_pages })
    }

    /// Returns the principal the API key belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn whoami(&self) -> Result<UserSelf> {
        self.get("/user/self/").await
    }

    /// Validates the API key by making a test request.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than rejected credentials.
    pub async fn validate_api_key(&self) -> Result<bool> {
        match self.whoami().await {
            Ok(user) => Ok(user.authenticated),
            Err(CloudsmithError::Api(ApiError::AuthenticationFailed { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Parses the page total header as a base-10 integer.
///
/// # Errors
///
/// Returns [`ApiError::MalformedPaginationHeader`] if the header is missing
/// or not a number.
pub fn parse_page_total(headers: &header::HeaderMap) -> Result<u32> {
    let raw = headers.get(PAGE_TOTAL_HEADER);
    let value = raw.and_then(|v| v.to_str().ok()).map(str::trim);

    value
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| {
            CloudsmithError::Api(ApiError::MalformedPaginationHeader {
                header: PAGE_TOTAL_HEADER,
                value: raw.map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
            })
        })
}
