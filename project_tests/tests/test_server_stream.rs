//! # SSE Server Integration Tests
//!
//! Serves the real router on a local port with the sample feed and reads the
//! event stream over HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use lib_eventstream::ingestors::{PollerSettings, SampleFeed};
use lib_eventstream::{ConfiguredFeed, EventsPoller};
use project_tests::parse_frames;
use serde_json::Value;
use servers::events_logic::{downstream, state::AppState};

async fn serve(polling_interval: Duration) -> (SocketAddr, EventsPoller<ConfiguredFeed>) {
    let poller = EventsPoller::new(
        ConfiguredFeed::Sample(SampleFeed::new()),
        PollerSettings {
            polling_interval,
            ..PollerSettings::default()
        },
    );
    let app = downstream::router(AppState::new(poller.clone(), "test"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, poller)
}

/// Reads frames from an open stream until `count` are in or the deadline passes.
async fn read_frames(response: &mut reqwest::Response, count: usize, deadline: Duration) -> Vec<Value> {
    let mut body = String::new();
    let _ = tokio::time::timeout(deadline, async {
        while parse_frames(&body).len() < count {
            match response.chunk().await {
                Ok(Some(chunk)) => body.push_str(&String::from_utf8_lossy(&chunk)),
                _ => break,
            }
        }
    })
    .await;
    parse_frames(&body)
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn stream_opens_with_connection_record_and_honours_filters() {
    let (addr, poller) = serve(Duration::from_millis(20)).await;

    let mut response = reqwest::get(format!("http://{addr}/stream/events?region=europe"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(poller.client_count(), 1);

    let frames = read_frames(&mut response, 3, Duration::from_secs(3)).await;
    assert_eq!(frames[0]["type"], "connection");
    assert_eq!(frames[0]["message"], "Connected to event stream");
    assert!(frames.len() >= 2, "no europe event within the deadline");
    for event in &frames[1..] {
        assert_eq!(event["region"], "europe");
        assert!(event["id"].as_str().unwrap().starts_with("evt-"));
    }

    drop(response);
    assert!(wait_until(|| poller.client_count() == 0).await);
    assert!(wait_until(|| !poller.is_running()).await);
}

#[tokio::test]
async fn late_subscriber_receives_buffered_events_first() {
    let (addr, poller) = serve(Duration::from_millis(20)).await;

    let mut first = reqwest::get(format!("http://{addr}/stream/events")).await.unwrap();
    read_frames(&mut first, 4, Duration::from_secs(3)).await;

    let mut second = reqwest::get(format!("http://{addr}/stream/events")).await.unwrap();
    let frames = read_frames(&mut second, 2, Duration::from_secs(3)).await;
    assert_eq!(frames[0]["type"], "connection");
    assert!(frames[1]["id"].is_string());
    assert_eq!(poller.client_count(), 2);
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let (addr, poller) = serve(Duration::from_secs(60)).await;

    let mut response = reqwest::get(format!("http://{addr}/stream/events")).await.unwrap();
    read_frames(&mut response, 1, Duration::from_secs(2)).await;

    poller.shutdown();
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        while let Ok(Some(_)) = response.chunk().await {}
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn health_reports_sample_mode() {
    let (addr, _poller) = serve(Duration::from_secs(60)).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(health["api"], "unavailable");
    assert_eq!(health["environment"], "test");
    assert_eq!(health["poller"]["isRunning"], false);
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn info_lists_the_endpoints() {
    let (addr, _poller) = serve(Duration::from_secs(60)).await;

    let info: Value = reqwest::get(format!("http://{addr}/api/info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let paths: Vec<&str> = info["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert_eq!(paths, vec!["/stream/events", "/health", "/api/info"]);
}
