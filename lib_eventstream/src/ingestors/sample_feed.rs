//! # Sample Feed
//!
//! Offline stand-in for the live API: a fixed set of logistics disruptions.
//! Each fetch replays one fixture chosen at random, under a fresh id and the
//! current timestamp, so subscribers see a steady trickle of "new" events.

use chrono::Utc;
use rand::Rng;

use crate::core::model::{random_event_id, EventKind, NormalizedEvent, Severity};
use crate::ingestors::feed::EventSource;
use crate::retrieve::ky_http::UpstreamError;

pub struct SampleFeed {
    fixtures: Vec<NormalizedEvent>,
}

impl Default for SampleFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleFeed {
    pub fn new() -> Self {
        Self::with_fixtures(fixtures())
    }

    /// Replays the given events instead of the built-in ones.
    pub fn with_fixtures(fixtures: Vec<NormalizedEvent>) -> Self {
        Self { fixtures }
    }

    pub fn fixtures(&self) -> &[NormalizedEvent] {
        &self.fixtures
    }

    fn pick(&self) -> Vec<NormalizedEvent> {
        if self.fixtures.is_empty() {
            return Vec::new();
        }
        let index = rand::rng().random_range(0..self.fixtures.len());
        vec![self.fixtures[index].restamped(random_event_id(), Utc::now())]
    }
}

impl EventSource for SampleFeed {
    async fn fetch(&self) -> Result<Vec<NormalizedEvent>, UpstreamError> {
        log::debug!("Using sample data (API key not provided)");
        Ok(self.pick())
    }

    fn label(&self) -> &'static str {
        "sample data"
    }
}

#[allow(clippy::too_many_arguments)]
fn fixture(
    id: &str,
    title: &str,
    location: &str,
    region: &str,
    severity: Severity,
    kind: EventKind,
    impact: &str,
    details: &str,
) -> NormalizedEvent {
    NormalizedEvent {
        id: id.to_string(),
        timestamp: Utc::now(),
        title: title.to_string(),
        location: location.to_string(),
        region: region.to_string(),
        severity,
        impact: impact.to_string(),
        details: details.to_string(),
        kind,
    }
}

/// The built-in fixture set.
pub fn fixtures() -> Vec<NormalizedEvent> {
    vec![
        fixture(
            "evt-001",
            "Port Congestion at Los Angeles",
            "Los Angeles, USA",
            "north-america",
            Severity::High,
            EventKind::Port,
            "Delays of 3-5 days expected for all shipments",
            "Labor shortages and increased volume causing significant backlog at container terminals.",
        ),
        fixture(
            "evt-002",
            "Severe Weather Alert: Typhoon Approaching",
            "South China Sea",
            "asia",
            Severity::Medium,
            EventKind::Weather,
            "Possible shipping delays for routes through Southeast Asia",
            "Typhoon Megi expected to make landfall within 48 hours. Shipping lanes may be affected.",
        ),
        fixture(
            "evt-003",
            "Rail Infrastructure Maintenance",
            "Central Europe",
            "europe",
            Severity::Low,
            EventKind::Infrastructure,
            "Minor delays for rail freight across Germany",
            "Scheduled maintenance on key rail corridors may cause slight delays for shipments this weekend.",
        ),
        fixture(
            "evt-004",
            "Customs Strike at Rotterdam Port",
            "Rotterdam, Netherlands",
            "europe",
            Severity::High,
            EventKind::Political,
            "Processing delays of up to 7 days expected",
            "Customs officials have announced a 48-hour strike starting tomorrow. Significant processing backlogs anticipated.",
        ),
        fixture(
            "evt-005",
            "Manufacturing Slowdown: Semiconductor Shortage",
            "Taiwan",
            "asia",
            Severity::Medium,
            EventKind::Infrastructure,
            "Production delays for electronic components",
            "Major semiconductor manufacturer reports production issues affecting global supply chain.",
        ),
        fixture(
            "evt-006",
            "Fuel Price Surge in South America",
            "Brazil",
            "south-america",
            Severity::Low,
            EventKind::Political,
            "Increased shipping costs expected",
            "Recent policy changes have led to rising fuel prices affecting transportation costs.",
        ),
        fixture(
            "evt-007",
            "Container Shortage Crisis",
            "Global",
            "all",
            Severity::High,
            EventKind::Infrastructure,
            "Shipping rates increasing by 25-40%",
            "Global imbalance in container distribution causing severe shortages in major export hubs.",
        ),
        fixture(
            "evt-008",
            "Suez Canal Traffic Congestion",
            "Egypt",
            "africa",
            Severity::Medium,
            EventKind::Port,
            "Transit delays of 2-3 days",
            "Higher than normal traffic volume causing congestion at both ends of the canal.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_fetch_replays_one_fixture_under_a_new_id() {
        let feed = SampleFeed::new();
        let first = feed.fetch().await.unwrap();
        let second = feed.fetch().await.unwrap();

        assert_eq!(first.len(), 1);
        assert_ne!(first[0].id, second[0].id);
        assert!(first[0].id.starts_with("evt-"));
        assert!(feed.fixtures().iter().any(|f| f.title == first[0].title));
        assert!(feed.fixtures().iter().all(|f| f.id != first[0].id));
    }

    #[test]
    fn fixture_set_covers_every_incident_kind() {
        let set = fixtures();
        assert_eq!(set.len(), 8);
        for tag in ["port", "weather", "infrastructure", "political"] {
            assert!(set.iter().any(|e| e.event_type() == tag), "missing {tag}");
        }
    }

    #[tokio::test]
    async fn empty_fixture_set_yields_empty_batches() {
        let feed = SampleFeed::with_fixtures(Vec::new());
        assert!(feed.fetch().await.unwrap().is_empty());
    }
}
