//! # `ky_http` Client Integration Tests
//!
//! Drives the real `reqwest`-backed `ApiClient` against the local mock
//! upstream: retry classification, backoff, per-endpoint timeouts, the
//! response cache and the token header.

use std::time::{Duration, Instant};

use lib_eventstream::{ApiClient, ClientOptions, RetryPolicy, UpstreamError};
use project_tests::{MockUpstream, Reply, search_envelope};
use reqwest::Method;
use serde_json::json;

fn fast_options() -> ClientOptions {
    ClientOptions {
        retry: RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(10),
            cap: Duration::from_millis(40),
        },
        ..ClientOptions::default()
    }
}

fn client(mock: &MockUpstream, options: ClientOptions) -> ApiClient {
    ApiClient::new(&mock.base_url, Some("secret".into()), options).unwrap()
}

#[tokio::test]
async fn transient_errors_are_retried_until_success() {
    let mock = MockUpstream::start().await;
    mock.script(
        "GET",
        "/health",
        vec![Reply::error(500), Reply::error(500), Reply::ok(json!({ "message": "Healthy" }))],
    );
    let api = client(&mock, fast_options());

    let started = Instant::now();
    let body = api.request(Method::GET, "/health", None, None).await.unwrap();

    assert_eq!(body["message"], "Healthy");
    assert_eq!(mock.hits("/health"), 3);
    // 10ms then 20ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn client_errors_fail_after_one_attempt() {
    let mock = MockUpstream::start().await;
    mock.script("GET", "/missing", vec![Reply::error(404)]);
    let api = client(&mock, fast_options());

    let err = api.request(Method::GET, "/missing", None, None).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(!err.is_retryable());
    assert_eq!(mock.hits("/missing"), 1);
}

#[tokio::test]
async fn rate_limiting_is_retried() {
    let mock = MockUpstream::start().await;
    mock.script(
        "POST",
        "/events_search",
        vec![Reply::error(429), Reply::ok(search_envelope(vec![]))],
    );
    let api = client(&mock, fast_options());

    let body = api
        .request(Method::POST, "/events_search", Some(&json!({ "q": 1 })), None)
        .await
        .unwrap();

    assert_eq!(body["message"], "Success");
    assert_eq!(mock.hits("/events_search"), 2);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let mock = MockUpstream::start().await;
    mock.script("GET", "/flaky", vec![Reply::error(502), Reply::error(503)]);
    let options = ClientOptions {
        retry: RetryPolicy {
            max_retries: 2,
            ..fast_options().retry
        },
        ..fast_options()
    };
    let api = client(&mock, options);

    let err = api.request(Method::GET, "/flaky", None, None).await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(mock.hits("/flaky"), 3);
}

#[tokio::test]
async fn get_responses_are_served_from_cache() {
    let mock = MockUpstream::start().await;
    mock.script("GET", "/health", vec![Reply::ok(json!({ "message": "Healthy" }))]);
    let api = client(&mock, fast_options());

    assert!(api.check_health().await);
    assert!(api.check_health().await);

    assert_eq!(mock.hits("/health"), 1);
    assert_eq!(api.cache_stats().active, 1);

    api.invalidate_cache();
    assert!(api.check_health().await);
    assert_eq!(mock.hits("/health"), 2);
}

#[tokio::test]
async fn disabled_cache_always_hits_upstream() {
    let mock = MockUpstream::start().await;
    mock.script("GET", "/health", vec![Reply::ok(json!({ "message": "Healthy" }))]);
    let api = client(
        &mock,
        ClientOptions {
            cache_enabled: false,
            ..fast_options()
        },
    );

    api.request(Method::GET, "/health", None, None).await.unwrap();
    api.request(Method::GET, "/health", None, None).await.unwrap();

    assert_eq!(mock.hits("/health"), 2);
    assert_eq!(api.cache_stats().total, 0);
    assert!(api.cached_response(&Method::GET, "/health", None, None).is_none());
}

#[tokio::test]
async fn search_results_are_stored_but_not_replayed() {
    let mock = MockUpstream::start().await;
    mock.script("POST", "/events_search", vec![Reply::ok(search_envelope(vec![]))]);
    let api = client(&mock, fast_options());
    let body = json!({ "event_type": "fundraising" });

    api.request(Method::POST, "/events_search", Some(&body), None).await.unwrap();
    api.request(Method::POST, "/events_search", Some(&body), None).await.unwrap();

    assert_eq!(mock.hits("/events_search"), 2);
    assert_eq!(api.cache_stats().total, 1);

    let stored = api.cached_response(&Method::POST, "/events_search", Some(&body), None);
    assert_eq!(stored, Some(search_envelope(vec![])));
    let other = json!({ "event_type": "acquisition" });
    assert!(api.cached_response(&Method::POST, "/events_search", Some(&other), None).is_none());
}

#[tokio::test]
async fn token_header_and_body_are_sent() {
    let mock = MockUpstream::start().await;
    mock.script("POST", "/events_search", vec![Reply::ok(search_envelope(vec![]))]);
    let api = client(&mock, fast_options());

    api.request(Method::POST, "/events_search", Some(&json!({ "k": "v" })), None)
        .await
        .unwrap();

    let hit = &mock.requests()[0];
    assert_eq!(hit.method, "POST");
    assert_eq!(hit.api_token.as_deref(), Some("secret"));
    assert_eq!(hit.body, json!({ "k": "v" }));
}

#[tokio::test]
async fn search_endpoint_gets_the_longer_timeout() {
    let mock = MockUpstream::start().await;
    let slow = Reply::ok(search_envelope(vec![])).delayed(Duration::from_millis(300));
    mock.script("GET", "/slow", vec![slow.clone()]);
    mock.script("POST", "/events_search", vec![slow]);
    let options = ClientOptions {
        timeout: Duration::from_millis(100),
        search_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries: 0,
            ..fast_options().retry
        },
        ..fast_options()
    };
    let api = client(&mock, options);

    let err = api.request(Method::GET, "/slow", None, None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport { .. }), "got {err:?}");
    assert!(err.is_retryable());

    let ok = api.request(Method::POST, "/events_search", Some(&json!({})), None).await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn unreachable_upstream_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = ClientOptions {
        retry: RetryPolicy {
            max_retries: 1,
            ..fast_options().retry
        },
        ..fast_options()
    };
    let api = ApiClient::new(&format!("http://{addr}/api"), None, options).unwrap();

    let err = api.request(Method::GET, "/health", None, None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport { .. }), "got {err:?}");
    assert!(!api.check_health().await);
}

#[tokio::test]
async fn unhealthy_message_reports_unhealthy() {
    let mock = MockUpstream::start().await;
    mock.script("GET", "/health", vec![Reply::ok(json!({ "message": "Degraded" }))]);
    let api = client(&mock, fast_options());

    assert!(!api.check_health().await);
}
