//! # Newscatcher API Client
//!
//! A typed client for the Newscatcher Events API built on [`ApiClient`].
//!
//! ## Core Features:
//! - **Fundraising search**: `POST /events_search` restricted to the last `K`
//!   days of extractions.
//! - **Envelope validation**: only `{"message": "Success", "events": [...]}`
//!   answers are accepted. Anything else is logged and treated as an empty
//!   result.
//! - **Pluggable transform**: every raw item goes through a [`TransformFn`],
//!   [`transform_fundraising`] unless the caller supplies another one.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};

use crate::configs::EngineConfig;
use crate::core::model::NormalizedEvent;
use crate::retrieve::ky_http::{ApiClient, UpstreamError};
use crate::sources::newscatcher::transform::transform_fundraising;

/// Maps one raw upstream item to a normalized event. Must be total.
pub type TransformFn = Arc<dyn Fn(&Value) -> NormalizedEvent + Send + Sync>;

const SEARCH_PATH: &str = "/events_search";

pub struct NewscatcherClient {
    api: ApiClient,
    transform: TransformFn,
}

impl NewscatcherClient {
    pub fn new(api: ApiClient, transform: TransformFn) -> Self {
        Self { api, transform }
    }

    /// Client using the default fundraising transform.
    pub fn with_default_transform(api: ApiClient) -> Self {
        Self::new(api, Arc::new(transform_fundraising))
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, UpstreamError> {
        Ok(Self::with_default_transform(ApiClient::from_config(config)?))
    }

    /// The underlying HTTP client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn check_health(&self) -> bool {
        self.api.check_health().await
    }

    /// # Fetch Fundraising Events
    ///
    /// Searches the fundraising events extracted in the last `days_back` days.
    ///
    /// # Errors
    /// Propagates the [`UpstreamError`] of the last attempt once the client's
    /// retries are exhausted. An unexpected envelope is not an error.
    pub async fn fetch_fundraising_events(
        &self,
        days_back: u32,
    ) -> Result<Vec<NormalizedEvent>, UpstreamError> {
        log::info!("Fetching fundraising events for the last {} days", days_back);

        let payload = fundraising_query(json!({
            "extraction_date": { "gte": format!("now-{days_back}d"), "lte": "now" }
        }));
        let response = self
            .api
            .request(Method::POST, SEARCH_PATH, Some(&payload), None)
            .await
            .inspect_err(|e| log::error!("Failed to fetch fundraising events: {}", e))?;

        match envelope_events(&response) {
            Some(items) => {
                log::info!("Retrieved {} fundraising events", items.len());
                Ok(items.iter().map(|item| (self.transform)(item)).collect())
            }
            None => {
                log::warn!("Unexpected API response format: {}", response);
                Ok(Vec::new())
            }
        }
    }

    /// Looks up one event by its upstream id. `Ok(None)` when not found.
    pub async fn get_event_by_id(
        &self,
        event_id: &str,
    ) -> Result<Option<NormalizedEvent>, UpstreamError> {
        let payload = fundraising_query(json!({ "id": event_id }));
        let response = self
            .api
            .request(Method::POST, SEARCH_PATH, Some(&payload), None)
            .await
            .inspect_err(|e| log::error!("Failed to fetch event with ID {}: {}", event_id, e))?;

        match envelope_events(&response).and_then(|items| items.first()) {
            Some(item) => Ok(Some((self.transform)(item))),
            None => {
                log::warn!("Event with ID {} not found", event_id);
                Ok(None)
            }
        }
    }
}

fn fundraising_query(additional_filters: Value) -> Value {
    json!({
        "event_type": "fundraising",
        "attach_articles_data": true,
        "additional_filters": additional_filters,
    })
}

/// The `events` array of a successful envelope.
fn envelope_events(response: &Value) -> Option<&Vec<Value>> {
    if response.get("message").and_then(Value::as_str) != Some("Success") {
        return None;
    }
    response.get("events").and_then(Value::as_array)
}
