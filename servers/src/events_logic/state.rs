use lib_eventstream::{ConfiguredFeed, EventsPoller};

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub poller: EventsPoller<ConfiguredFeed>,
    // Runtime environment reported by /health
    pub environment: String,
}

impl AppState {
    pub fn new(poller: EventsPoller<ConfiguredFeed>, environment: impl Into<String>) -> Self {
        Self {
            poller,
            environment: environment.into(),
        }
    }

    /// Upstream status as reported by /health.
    pub async fn api_status(&self) -> &'static str {
        match self.poller.source().check_health().await {
            None => "unavailable",
            Some(true) => "healthy",
            Some(false) => "unhealthy",
        }
    }
}
