use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{extract::State, http::Uri, response::Json};
use serde::Serialize;

use crate::common::errors::ApiError;
use crate::common::types::now_ms;
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: &'static str,
    pub timestamp: u64,
    pub server: &'static str,
    pub version: &'static str,
    pub uptime_ms: u64,
    /// Whether the relay currently considers the presence sink
    /// reachable. The extension surfaces this in its popup.
    pub discord_connected: bool,
}

/// GET /ping
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    tracing::debug!("GET /ping");
    let now = now_ms();
    Json(PingResponse {
        status: "ok",
        timestamp: now,
        server: "tunelink",
        version: env!("CARGO_PKG_VERSION"),
        uptime_ms: now.saturating_sub(state.started_at_ms),
        discord_connected: state.sink_healthy.load(Ordering::SeqCst),
    })
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found("route not found", uri.path())
}
