//! Crossref API client.
//!
//! [`ApiClient`] is the narrow contract the paginator depends on: one
//! parameterized GET per call, returning status and body, or failing with
//! [`CrossrefError::Transport`] when no HTTP exchange happened at all.
//! [`CrossrefClient`] is the reqwest implementation, throttled by a shared
//! [`RateLimiter`].

use crate::error::{CrossrefError, Result};
use crate::rate_limit::{RateLimiter, RateLimiterConfig};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Crossref API base URL
pub const CROSSREF_API_URL: &str = "https://api.crossref.org";

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw outcome of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Final request URL, query string included
    pub url: String,
    /// Response body
    pub body: String,
}

impl ApiResponse {
    /// Only a plain 200 counts as success
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// A single parameterized GET against the API.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Query `component` with the given query-string parameters.
    ///
    /// Non-200 statuses are returned as `Ok`; only network-level failures
    /// produce `Err`.
    async fn query(
        &self,
        component: &str,
        timeout: Duration,
        params: &[(String, String)],
    ) -> Result<ApiResponse>;
}

/// Connection settings for [`CrossrefClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, without the component path
    pub base_url: String,
    /// Contact address for Crossref's polite pool
    pub mailto: Option<String>,
    /// User agent string
    pub user_agent: String,
    /// Rate limit used when the client builds its own limiter
    pub rate_limit: RateLimiterConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: CROSSREF_API_URL.to_string(),
            mailto: None,
            user_agent: format!("rustcrossref/{}", env!("CARGO_PKG_VERSION")),
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Set the API root
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Identify yourself to Crossref's polite pool
    #[must_use]
    pub fn mailto(mut self, email: impl Into<String>) -> Self {
        self.mailto = Some(email.into());
        self
    }

    /// Set the rate limit
    #[must_use]
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limit = config;
        self
    }
}

/// Crossref API client with shared rate limiting
#[derive(Debug, Clone)]
pub struct CrossrefClient {
    client: reqwest::Client,
    base_url: Url,
    mailto: Option<String>,
    rate_limiter: RateLimiter,
}

impl CrossrefClient {
    /// Create a client with its own rate limiter
    pub fn new(config: ClientConfig) -> Result<Self> {
        let limiter = RateLimiter::new(&config.rate_limit)?;
        Self::with_rate_limiter(config, limiter)
    }

    /// Create a client drawing from an existing, possibly shared, limiter
    pub fn with_rate_limiter(config: ClientConfig, rate_limiter: RateLimiter) -> Result<Self> {
        let user_agent = match &config.mailto {
            Some(mailto) => format!("{} (mailto:{})", config.user_agent, mailto),
            None => config.user_agent.clone(),
        };

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| CrossrefError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CrossrefError::Config(format!("Invalid base URL {}: {}", config.base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            mailto: config.mailto,
            rate_limiter,
        })
    }

    /// The limiter this client waits on
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Absolute URL of a component path
    fn component_url(&self, component: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = format!("{}/{}", base, component.trim_matches('/'));
        Url::parse(&url).map_err(|e| CrossrefError::Config(format!("Invalid component {}: {}", component, e)))
    }
}

#[async_trait]
impl ApiClient for CrossrefClient {
    async fn query(
        &self,
        component: &str,
        timeout: Duration,
        params: &[(String, String)],
    ) -> Result<ApiResponse> {
        let url = self.component_url(component)?;

        self.rate_limiter.wait().await;

        let mut request = self.client.get(url).query(params).timeout(timeout);
        if let Some(mailto) = &self.mailto {
            request = request.query(&[("mailto", mailto)]);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();

        // Rate limit hints from Crossref
        if let Some(limit) = response.headers().get("X-Rate-Limit-Limit") {
            debug!(limit = ?limit, "Rate limit");
        }

        let body = response.text().await?;
        debug!(status, url = %url, bytes = body.len(), "Crossref response");

        Ok(ApiResponse { status, url, body })
    }
}
