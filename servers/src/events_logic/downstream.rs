use crate::events_logic::state::AppState;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use futures_util::stream;
use lib_eventstream::{ClientId, ConfiguredFeed, EventFilter, EventsPoller};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

// Frames queued per connection before the subscriber counts as too slow
const CLIENT_QUEUE: usize = 256;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/events", get(stream_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .with_state(state)
}

pub async fn run(
    port: u16,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Downstream server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Downstream server shutting down.");
        })
        .await?;
    Ok(())
}

/// Unregisters the subscriber when its response body is dropped.
struct ClientGuard {
    poller: EventsPoller<ConfiguredFeed>,
    id: ClientId,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.poller.remove_client(self.id);
        log::info!("Client {} disconnected from SSE stream", self.id);
    }
}

async fn stream_handler(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Response {
    log::info!(
        "New SSE connection established with filters: {}",
        serde_json::to_string(&filter).unwrap_or_default()
    );

    let capacity = CLIENT_QUEUE + state.poller.settings().initial_events;
    let (tx, rx) = mpsc::channel::<String>(capacity);

    let id = match state.poller.add_client(filter, Arc::new(tx)) {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Rejected SSE connection: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "Event stream unavailable").into_response();
        }
    };

    let guard = ClientGuard {
        poller: state.poller.clone(),
        id,
    };
    let frames = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(frame), (rx, guard)))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let poller = state.poller.state();

    Json(json!({
        "status": "ok",
        "api": state.api_status().await,
        "environment": state.environment,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "clients": state.poller.client_count(),
        "poller": {
            "isRunning": poller.is_running,
            "consecutiveErrors": poller.consecutive_errors,
            "lastEventId": poller.last_event_id,
        },
    }))
}

async fn info_handler() -> Json<Value> {
    Json(json!({
        "name": "Event Horizon API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Real-time events monitoring API powered by Newscatcher",
        "endpoints": [
            {
                "path": "/stream/events",
                "method": "GET",
                "description": "Server-Sent Events endpoint for real-time events",
                "parameters": {
                    "region": "Filter by region (all, asia, europe, north-america, etc.)",
                    "severity": "Filter by severity (all, high, medium, low)",
                    "type": "Filter by event type (all, fundraising, port, weather, etc.)",
                    "fundingType": "Filter by funding type (all, Series A, Seed, etc.)",
                    "amount": "Filter by amount bucket (all, high, medium, low)",
                    "company": "Case-insensitive company name substring"
                }
            },
            { "path": "/health", "method": "GET", "description": "Health check endpoint" },
            { "path": "/api/info", "method": "GET", "description": "API information endpoint" }
        ]
    }))
}
