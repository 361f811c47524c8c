//! HTTP transport — ingestion endpoint, WebSocket fan-out and metrics.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /events` — broadcast one event. Body = JSON object.
//! - `GET /ws` — WebSocket upgrade; receives every later event as a text frame.
//! - `GET /metrics` — Prometheus text exposition.
//! - `GET /health` — `{ "ok": true, "subscribers": n }`.
//!
//! ## Example
//!
//! ```ignore
//! use trail_relay::{http, RelayHub};
//!
//! let hub = RelayHub::builder().build()?;
//!
//! // Get the router to compose with other axum routes
//! let app = http::router(hub.clone());
//!
//! // Or serve directly; returns once the hub shuts down
//! http::serve(hub, "0.0.0.0:8000").await?;
//! ```

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{future, SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::connection::{PeerFrame, PendingConnection};
use crate::error::RelayError;
use crate::event::{Ingest, Payload};
use crate::hub::RelayHub;
use crate::metrics::CONTENT_TYPE;

/// Build an axum `Router` serving the relay endpoints for `hub`.
pub fn router(hub: RelayHub) -> Router {
    Router::new()
        .route("/events", post(events_handler))
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

/// Serve the relay at `addr` (e.g. `"0.0.0.0:8000"`) until the hub shuts down.
pub async fn serve(hub: RelayHub, addr: &str) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(hub, listener).await
}

/// Serve on an already bound listener until the hub shuts down.
pub async fn serve_with_listener(
    hub: RelayHub,
    listener: TcpListener,
) -> Result<(), std::io::Error> {
    let shutdown = hub.shutdown_token();
    info!(addr = ?listener.local_addr().ok(), "Relay listening");
    axum::serve(listener, router(hub))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// `POST /events` — decode the body and broadcast it.
async fn events_handler(State(hub): State<RelayHub>, body: Bytes) -> Response {
    match hub.ingest(Ingest::Bytes(body.to_vec())) {
        Ok(report) => {
            debug!(
                reached = report.reached,
                dropped = report.dropped.len(),
                "Event sent"
            );
            (StatusCode::OK, Json(json!({ "status": "event sent" }))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// `GET /ws` — upgrade and relay events until the peer goes away.
async fn ws_handler(State(hub): State<RelayHub>, ws: WebSocketUpgrade) -> Response {
    match hub.connections().accept() {
        Ok(pending) => ws.on_upgrade(move |socket| relay_socket(pending, socket)),
        Err(e) => error_response(&e),
    }
}

async fn relay_socket(pending: PendingConnection, socket: WebSocket) {
    let connection = match pending.open() {
        Ok(connection) => connection,
        Err(e) => {
            debug!(error = %e, "Upgraded socket refused");
            return;
        }
    };

    let (sink, stream) = socket.split();
    let sink = sink.with(|payload: Payload| {
        future::ready(Ok::<_, axum::Error>(Message::Text(payload.to_string())))
    });
    let stream = stream.map(|frame| frame.map(peer_frame));

    connection.run(sink, stream).await;
}

fn peer_frame(message: Message) -> PeerFrame {
    match message {
        Message::Text(text) => PeerFrame::Text(text),
        Message::Close(_) => PeerFrame::Close,
        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => PeerFrame::Other,
    }
}

/// `GET /metrics` — Prometheus text exposition.
async fn metrics_handler(State(hub): State<RelayHub>) -> Response {
    match hub.metrics().snapshot() {
        Ok(text) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /health` — returns `{ "ok": true, "subscribers": n }`.
async fn health_handler(State(hub): State<RelayHub>) -> impl IntoResponse {
    Json(json!({ "ok": !hub.is_shutting_down(), "subscribers": hub.subscriber_count() }))
}

fn error_response(e: &RelayError) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
