//! # Event Feeds
//!
//! An [`EventSource`] produces one batch of normalized events per poll cycle,
//! newest first. The poller is generic over it so tests can script the
//! upstream and the server can pick between the live API and the sample data.

use std::future::Future;

use crate::configs::EngineConfig;
use crate::core::model::NormalizedEvent;
use crate::ingestors::sample_feed::SampleFeed;
use crate::retrieve::ky_http::UpstreamError;
use crate::sources::newscatcher::NewscatcherClient;

pub trait EventSource: Send + Sync + 'static {
    /// Fetches the next batch, newest first.
    fn fetch(&self) -> impl Future<Output = Result<Vec<NormalizedEvent>, UpstreamError>> + Send;

    /// Short description used in logs.
    fn label(&self) -> &'static str {
        "custom feed"
    }
}

/// Fundraising events from the Newscatcher API.
pub struct NewscatcherFeed {
    client: NewscatcherClient,
    days_back: u32,
}

impl NewscatcherFeed {
    pub fn new(client: NewscatcherClient, days_back: u32) -> Self {
        Self { client, days_back }
    }

    pub fn client(&self) -> &NewscatcherClient {
        &self.client
    }
}

impl EventSource for NewscatcherFeed {
    async fn fetch(&self) -> Result<Vec<NormalizedEvent>, UpstreamError> {
        log::debug!("Polling Newscatcher API for events");
        self.client.fetch_fundraising_events(self.days_back).await
    }

    fn label(&self) -> &'static str {
        "real API"
    }
}

/// The feed selected by configuration: the live API when a key is present,
/// the sample data otherwise.
pub enum ConfiguredFeed {
    Live(NewscatcherFeed),
    Sample(SampleFeed),
}

impl ConfiguredFeed {
    pub fn from_config(config: &EngineConfig) -> Result<Self, UpstreamError> {
        if config.has_api_key() {
            let client = NewscatcherClient::from_config(config)?;
            Ok(ConfiguredFeed::Live(NewscatcherFeed::new(client, config.days_back)))
        } else {
            Ok(ConfiguredFeed::Sample(SampleFeed::new()))
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ConfiguredFeed::Live(_))
    }

    /// Upstream health, `None` when running on sample data.
    pub async fn check_health(&self) -> Option<bool> {
        match self {
            ConfiguredFeed::Live(feed) => Some(feed.client().check_health().await),
            ConfiguredFeed::Sample(_) => None,
        }
    }
}

impl EventSource for ConfiguredFeed {
    async fn fetch(&self) -> Result<Vec<NormalizedEvent>, UpstreamError> {
        match self {
            ConfiguredFeed::Live(feed) => feed.fetch().await,
            ConfiguredFeed::Sample(feed) => feed.fetch().await,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ConfiguredFeed::Live(feed) => feed.label(),
            ConfiguredFeed::Sample(feed) => feed.label(),
        }
    }
}
