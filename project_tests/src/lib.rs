//! # Test Harness
//!
//! A scripted stand-in for the Newscatcher Events API, served by `axum` on a
//! random local port. Each `(method, path)` pair replays a list of replies;
//! the last reply repeats once the list is exhausted. Every request is
//! recorded so tests can count attempts and inspect payloads.

#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

/// Path prefix the mock serves the API under.
pub const API_PREFIX: &str = "/api";

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn error(status: u16) -> Self {
        Self::json(status, json!({ "message": format!("status {status}") }))
    }

    /// Answers only after `delay`.
    pub fn delayed(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }
}

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub api_token: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), VecDeque<Reply>>>,
    hits: Mutex<Vec<Hit>>,
}

pub struct MockUpstream {
    /// Base URL to hand to the client, e.g. `http://127.0.0.1:PORT/api`.
    pub base_url: String,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}{API_PREFIX}"),
            state,
            server,
        }
    }

    /// Replies for `method path` (path relative to the API prefix, e.g. `/health`).
    pub fn script(&self, method: &str, path: &str, replies: Vec<Reply>) {
        self.state.routes.lock().unwrap().insert(
            (method.to_uppercase(), format!("{API_PREFIX}{path}")),
            replies.into(),
        );
    }

    pub fn requests(&self) -> Vec<Hit> {
        self.state.hits.lock().unwrap().clone()
    }

    /// Number of requests received on `path`.
    pub fn hits(&self, path: &str) -> usize {
        let full = format!("{API_PREFIX}{path}");
        self.requests().iter().filter(|h| h.path == full).count()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.hits.lock().unwrap().push(Hit {
        method: method.to_string(),
        path: path.clone(),
        api_token: headers
            .get("x-api-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let reply = {
        let mut routes = state.routes.lock().unwrap();
        routes
            .get_mut(&(method.to_string(), path))
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
    };

    let Some(reply) = reply else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response();
    };

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

/// A successful search envelope around `events`.
pub fn search_envelope(events: Vec<Value>) -> Value {
    json!({ "message": "Success", "events": events })
}

/// A raw fundraising item as the provider returns it.
pub fn raw_fundraising(id: &str, company: &str, amount: f64, funding_type: &str) -> Value {
    json!({
        "id": id,
        "company_name": company,
        "extraction_date": "2025-03-14 09:30:00",
        "fundraising": {
            "amount": amount,
            "currency": "USD",
            "funding_type": funding_type,
            "investors": ["Fund I"]
        }
    })
}

/// Splits an SSE body into the JSON payloads of its `data:` records.
pub fn parse_frames(buffer: &str) -> Vec<Value> {
    buffer
        .split("\n\n")
        .filter_map(|record| record.strip_prefix("data: "))
        .filter_map(|json| serde_json::from_str(json).ok())
        .collect()
}
