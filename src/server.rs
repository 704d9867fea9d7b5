//! HTTP exposition endpoint.
//!
//! Serves the shared metrics sink in the Prometheus text format. Handlers
//! only read the sink; they never touch device sessions.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sink: Registry,
    /// Devices with a running poller.
    pub devices: usize,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    devices: usize,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

async fn root_handler() -> &'static str {
    "called /"
}

/// Liveness probe.
async fn healthz_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        devices: state.devices,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.sink.gather();
    let mut body = Vec::new();
    match encoder.encode(&families, &mut body) {
        Ok(()) => {
            let content_type = encoder.format_type().to_string();
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
