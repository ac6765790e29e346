//! # HTTP Retrieval Utilities
//!
//! This module provides a resilient, asynchronous API client wrapper around `reqwest`.
//! It retries transient failures with capped exponential backoff, applies
//! endpoint-specific timeouts and keeps a TTL cache of successful responses.
//!
//! ## Error classification:
//! - No response (connect error, timeout) and `5xx`/`429` answers are transient
//!   and retried.
//! - Any other `4xx` answer is permanent and returned at once.
//! - A successful answer whose body is not JSON is permanent.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Method};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::configs::EngineConfig;
use crate::core::ttl_cache::{CacheStats, TtlCache};

/// Path fragment identifying the long-running search endpoint.
pub const SEARCH_ENDPOINT: &str = "events_search";

const API_TOKEN_HEADER: &str = "x-api-token";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("no response from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode upstream payload: {0}")]
    Decode(#[source] reqwest::Error),
}

impl UpstreamError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport { .. } => true,
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Capped exponential backoff: `min(base * 2^(attempt - 1), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(1_000),
            cap: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed `attempt` (counted from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }
}

/// Tunables of an [`ApiClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Timeout applied to the search endpoint.
    pub search_timeout: Duration,
    pub retry: RetryPolicy,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    /// Lifetime of stored search responses. `request` never answers a search
    /// from the cache, so every poll reaches the provider; stored searches are
    /// read back through [`ApiClient::cached_response`].
    pub search_cache_ttl: Duration,
    pub cache_cleanup_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ClientOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            search_timeout: config.search_timeout(),
            retry: RetryPolicy {
                max_retries: config.retries,
                base: Duration::from_millis(config.backoff_base_ms),
                cap: Duration::from_millis(config.backoff_cap_ms),
            },
            cache_enabled: config.cache_enabled,
            cache_ttl: config.cache_ttl(),
            search_cache_ttl: config.search_cache_ttl(),
            cache_cleanup_interval: config.cache_cleanup_interval(),
        }
    }
}

/// A resilient asynchronous HTTP client.
///
/// Handles the base URL, the API token, retries and the response cache. The
/// cache is private to the client.
pub struct ApiClient {
    /// The underlying `reqwest` client, reused for connection pooling.
    inner: reqwest::Client,
    /// Base URL every endpoint path is appended to, without trailing slash.
    base_url: String,
    /// Value of the `x-api-token` header.
    api_key: Option<String>,
    options: ClientOptions,
    cache: Arc<TtlCache<String, Value>>,
    /// Stops the cache sweep when the client is dropped.
    reaper: Option<CancellationToken>,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// When called inside a tokio runtime the background cache sweep is
    /// started as well.
    ///
    /// # Arguments
    /// * `base_url` - Absolute base URL (e.g. "https://events.newscatcherapi.xyz/api").
    /// * `api_key` - Optional token sent in the `x-api-token` header.
    /// * `options` - Timeouts, retry policy and cache settings.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not an absolute URL or the HTTP client
    /// cannot be built.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        options: ClientOptions,
    ) -> Result<Self, UpstreamError> {
        url::Url::parse(base_url)?;

        if api_key.is_none() {
            log::warn!("ApiClient initialized without API key. API calls will fail.");
        }

        let inner = reqwest::Client::builder()
            .user_agent("EventStream/1.0")
            .build()
            .map_err(UpstreamError::Client)?;

        let cache: Arc<TtlCache<String, Value>> = Arc::new(TtlCache::new());
        let reaper = tokio::runtime::Handle::try_current()
            .ok()
            .map(|_| cache.start_reaper(options.cache_cleanup_interval));

        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            options,
            cache,
            reaper,
        })
    }

    /// Builds a client from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, UpstreamError> {
        Self::new(
            &config.base_url,
            config.api_key.clone().filter(|k| !k.trim().is_empty()),
            ClientOptions::from(config),
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The fresh cached response for a request, if any. Unlike `request`, this
    /// also returns stored search results.
    pub fn cached_response(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&Value>,
        params: Option<&[(String, String)]>,
    ) -> Option<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.cache.get(&cache_key(method, &url, body, params))
    }

    /// Drops every cached response.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Performs a request with caching and retries.
    ///
    /// ## Logic:
    /// 1.  A `GET` whose cache key is fresh is answered from the cache.
    /// 2.  The call is issued with the endpoint's timeout.
    /// 3.  Transient failures are retried up to `max_retries` times, sleeping
    ///     `retry.backoff(attempt)` between attempts. Permanent failures are
    ///     returned immediately.
    /// 4.  Successful `GET`s are cached for `cache_ttl`, successful `POST`s to
    ///     the search endpoint for `search_cache_ttl`.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb.
    /// * `endpoint` - Path appended to the base URL (e.g. "/events_search").
    /// * `body` - Optional JSON body.
    /// * `params` - Optional query parameters.
    ///
    /// # Errors
    /// The last encountered [`UpstreamError`] once retries are exhausted, or the
    /// first permanent one.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        params: Option<&[(String, String)]>,
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let cache_key = cache_key(&method, &url, body, params);
        let is_search = endpoint.contains(SEARCH_ENDPOINT);

        // 1. Serve fresh GETs from the cache
        if self.options.cache_enabled && method == Method::GET {
            if let Some(cached) = self.cache.get(&cache_key) {
                log::debug!("Cache hit for {}", cache_key);
                return Ok(cached);
            }
        }

        let timeout = if is_search {
            self.options.search_timeout
        } else {
            self.options.timeout
        };
        let retry = self.options.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            log::debug!("Making {} request to {} (attempt {})", method, url, attempt);

            // 2. Issue the call
            match self.execute(&method, &url, body, params, timeout).await {
                Ok(payload) => {
                    // 4. Populate the cache
                    if self.options.cache_enabled {
                        if method == Method::GET {
                            self.cache.set(cache_key, payload.clone(), self.options.cache_ttl);
                        } else if method == Method::POST && is_search {
                            self.cache
                                .set(cache_key, payload.clone(), self.options.search_cache_ttl);
                        }
                    }
                    return Ok(payload);
                }
                Err(err) => {
                    match &err {
                        UpstreamError::Status { .. } => log::error!("{}", err),
                        UpstreamError::Transport { .. } => {
                            log::error!("API request error: no response received ({})", err)
                        }
                        _ => log::error!("API request setup error: {}", err),
                    }

                    // 3. Give up on permanent errors or once retries are spent
                    if !err.is_retryable() || attempt > retry.max_retries {
                        return Err(err);
                    }

                    let delay = retry.backoff(attempt);
                    log::debug!(
                        "Retrying in {}ms (attempt {} of {})",
                        delay.as_millis(),
                        attempt,
                        retry.max_retries
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn execute(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        params: Option<&[(String, String)]>,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let mut req = self
            .inner
            .request(method.clone(), url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json");

        if let Some(key) = &self.api_key {
            req = req.header(API_TOKEN_HEADER, key);
        }
        if let Some(p) = params {
            req = req.query(p);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let response = req.send().await.map_err(|source| UpstreamError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        response.json::<Value>().await.map_err(|source| {
            if source.is_timeout() {
                UpstreamError::Transport {
                    url: url.to_string(),
                    source,
                }
            } else {
                UpstreamError::Decode(source)
            }
        })
    }

    /// Probes `GET /health`. Any failure counts as unhealthy.
    pub async fn check_health(&self) -> bool {
        match self.request(Method::GET, "/health", None, None).await {
            Ok(response) => response.get("message").and_then(Value::as_str) == Some("Healthy"),
            Err(e) => {
                log::error!("API health check failed: {}", e);
                false
            }
        }
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        if let Some(token) = &self.reaper {
            token.cancel();
        }
    }
}

/// Cache key made of the full request signature.
fn cache_key(
    method: &Method,
    url: &str,
    body: Option<&Value>,
    params: Option<&[(String, String)]>,
) -> String {
    let body = body.map_or_else(|| "null".to_string(), Value::to_string);
    let params = params
        .and_then(|p| serde_json::to_string(p).ok())
        .unwrap_or_else(|| "null".to_string());
    format!("{method}:{url}:{body}:{params}")
}

/// Pulls `message` out of an error body, if it is JSON.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string())
}
