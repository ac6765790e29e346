//! # Newscatcher Client and Poller Integration Tests
//!
//! The typed client against the mock provider, and the poller fanning the
//! transformed events out to channel sinks.

use std::sync::Arc;
use std::time::Duration;

use lib_eventstream::core::{EventKind, Fundraising, Severity};
use lib_eventstream::ingestors::{NewscatcherFeed, PollerSettings};
use lib_eventstream::{
    ApiClient, ClientOptions, EventFilter, EventsPoller, NewscatcherClient, NormalizedEvent,
    RetryPolicy, TransformFn,
};
use project_tests::{MockUpstream, Reply, parse_frames, raw_fundraising, search_envelope};
use serde_json::{Value, json};
use tokio::sync::mpsc;

fn api(mock: &MockUpstream) -> ApiClient {
    let options = ClientOptions {
        retry: RetryPolicy {
            max_retries: 1,
            base: Duration::from_millis(5),
            cap: Duration::from_millis(5),
        },
        ..ClientOptions::default()
    };
    ApiClient::new(&mock.base_url, Some("secret".into()), options).unwrap()
}

#[tokio::test]
async fn fundraising_search_is_transformed() {
    let mock = MockUpstream::start().await;
    mock.script(
        "POST",
        "/events_search",
        vec![Reply::ok(search_envelope(vec![
            raw_fundraising("nc-2", "Acme Robotics", 150_000_000.0, "Series C"),
            raw_fundraising("nc-1", "Tiny Labs", 500_000.0, "Seed"),
        ]))],
    );
    let client = NewscatcherClient::with_default_transform(api(&mock));

    let events = client.fetch_fundraising_events(3).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "nc-2");
    assert_eq!(events[0].severity, Severity::High);
    assert_eq!(events[0].title, "Acme Robotics Raises 150.0M USD in Series C Round");
    assert_eq!(events[1].severity, Severity::Low);

    let sent = &mock.requests()[0].body;
    assert_eq!(sent["event_type"], "fundraising");
    assert_eq!(sent["attach_articles_data"], true);
    assert_eq!(sent["additional_filters"]["extraction_date"]["gte"], "now-3d");
    assert_eq!(sent["additional_filters"]["extraction_date"]["lte"], "now");
}

#[tokio::test]
async fn unexpected_envelope_yields_no_events() {
    let mock = MockUpstream::start().await;
    mock.script(
        "POST",
        "/events_search",
        vec![Reply::ok(json!({ "message": "Quota exceeded", "events": null }))],
    );
    let client = NewscatcherClient::with_default_transform(api(&mock));

    assert!(client.fetch_fundraising_events(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_failure_propagates() {
    let mock = MockUpstream::start().await;
    mock.script("POST", "/events_search", vec![Reply::error(401)]);
    let client = NewscatcherClient::with_default_transform(api(&mock));

    let err = client.fetch_fundraising_events(1).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn event_lookup_by_id() {
    let mock = MockUpstream::start().await;
    mock.script(
        "POST",
        "/events_search",
        vec![
            Reply::ok(search_envelope(vec![raw_fundraising("nc-9", "Acme", 2_000_000.0, "Seed")])),
            Reply::ok(search_envelope(vec![])),
        ],
    );
    let client = NewscatcherClient::with_default_transform(api(&mock));

    let found = client.get_event_by_id("nc-9").await.unwrap();
    assert_eq!(found.map(|e| e.id).as_deref(), Some("nc-9"));
    assert_eq!(mock.requests()[0].body["additional_filters"]["id"], "nc-9");

    assert!(client.get_event_by_id("nc-404").await.unwrap().is_none());
}

#[tokio::test]
async fn custom_transform_is_applied_to_every_item() {
    let mock = MockUpstream::start().await;
    mock.script(
        "POST",
        "/events_search",
        vec![Reply::ok(search_envelope(vec![json!({ "id": "a" }), json!({ "id": "b" })]))],
    );
    let transform: TransformFn = Arc::new(|raw: &Value| NormalizedEvent {
        id: format!("custom-{}", raw["id"].as_str().unwrap_or("?")),
        timestamp: chrono::Utc::now(),
        title: "custom".into(),
        location: "Global".into(),
        region: "all".into(),
        severity: Severity::Low,
        impact: String::new(),
        details: String::new(),
        kind: EventKind::Fundraising(Fundraising {
            company: "Custom".into(),
            amount: None,
            currency: "USD".into(),
            funding_type: "Seed".into(),
            investors: vec![],
            original: raw.clone(),
        }),
    });
    let client = NewscatcherClient::new(api(&mock), transform);

    let ids: Vec<String> = client
        .fetch_fundraising_events(3)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["custom-a", "custom-b"]);
}

#[tokio::test]
async fn poller_fans_out_filtered_events_from_the_live_feed() {
    let mock = MockUpstream::start().await;
    mock.script(
        "POST",
        "/events_search",
        vec![Reply::ok(search_envelope(vec![
            raw_fundraising("big", "Acme Robotics", 250_000_000.0, "Series C"),
            raw_fundraising("small", "Tiny Labs", 400_000.0, "Seed"),
        ]))],
    );
    let feed = NewscatcherFeed::new(NewscatcherClient::with_default_transform(api(&mock)), 3);
    let poller = EventsPoller::new(
        feed,
        PollerSettings {
            polling_interval: Duration::from_secs(60),
            ..PollerSettings::default()
        },
    );

    let (high_tx, mut high_rx) = mpsc::unbounded_channel::<String>();
    let (seed_tx, mut seed_rx) = mpsc::unbounded_channel::<String>();
    let high = EventFilter {
        amount: Some("high".into()),
        ..Default::default()
    };
    let seed = EventFilter {
        funding_type: Some("Seed".into()),
        company: Some("tiny".into()),
        ..Default::default()
    };
    let high_id = poller.add_client(high, Arc::new(high_tx)).unwrap();
    poller.add_client(seed, Arc::new(seed_tx)).unwrap();
    assert!(poller.is_running());

    let high_frames = collect(&mut high_rx, 2).await;
    let seed_frames = collect(&mut seed_rx, 2).await;

    assert_eq!(high_frames[0]["type"], "connection");
    assert_eq!(high_frames[1]["id"], "big");
    assert_eq!(high_frames[1]["company"], "Acme Robotics");
    assert_eq!(seed_frames[1]["id"], "small");
    assert_eq!(seed_frames[1]["fundingType"], "Seed");
    assert_eq!(poller.state().last_event_id.as_deref(), Some("big"));

    assert!(poller.remove_client(high_id));
    assert!(poller.is_running());
    poller.shutdown();
    assert!(!poller.is_running());
}

/// Reads `count` frames, failing after two seconds.
async fn collect(rx: &mut mpsc::UnboundedReceiver<String>, count: usize) -> Vec<Value> {
    let mut frames = Vec::new();
    while frames.len() < count {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame in time")
            .expect("sink open");
        frames.extend(parse_frames(&frame));
    }
    frames
}
