//! # Engine Configuration
//!
//! Every knob the engine reads, with the defaults used when a value is not
//! provided. Durations are stored as milliseconds so the struct maps one to
//! one onto JSON config files and environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upstream base URL for the Newscatcher Events API.
pub const DEFAULT_BASE_URL: &str = "https://events.newscatcherapi.xyz/api";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid base url '{url}': {reason}")]
    BaseUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// Credential for the upstream provider. Without it the sample feed is used.
    pub api_key: Option<String>,
    pub polling_interval_ms: u64,
    /// Capacity of the event buffer.
    pub max_events: usize,
    /// Consecutive failed poll cycles before the poller stops itself.
    pub max_consecutive_errors: u32,
    /// Number of buffered events replayed to a newly connected subscriber.
    pub initial_events: usize,
    /// Look-back window of the fundraising search, in days.
    pub days_back: u32,
    /// Additional attempts after the first failed request.
    pub retries: u32,
    pub request_timeout_ms: u64,
    /// Timeout for the long-running search endpoint.
    pub search_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub cache_enabled: bool,
    pub cache_ttl_ms: u64,
    pub search_cache_ttl_ms: u64,
    /// Cadence of the background sweep that drops expired cache entries.
    pub cache_cleanup_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            polling_interval_ms: 30_000,
            max_events: 100,
            max_consecutive_errors: 5,
            initial_events: 5,
            days_back: 3,
            retries: 3,
            request_timeout_ms: 15_000,
            search_timeout_ms: 30_000,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 10_000,
            cache_enabled: true,
            cache_ttl_ms: 5 * 60 * 1_000,
            search_cache_ttl_ms: 2 * 60 * 1_000,
            cache_cleanup_interval_ms: 60 * 1_000,
        }
    }
}

impl EngineConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn search_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.search_cache_ttl_ms)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cache_cleanup_interval_ms)
    }

    /// True when a non-empty upstream credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling_interval_ms == 0 {
            return Err(ConfigError::Zero("pollingIntervalMs"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::Zero("maxEvents"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::Zero("maxConsecutiveErrors"));
        }
        if self.cache_cleanup_interval_ms == 0 {
            return Err(ConfigError::Zero("cacheCleanupIntervalMs"));
        }
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
