use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::common::types::now_ms;
use crate::protocol::UpdatePayload;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

/// POST /update
///
/// Accepts a scraped sample from the extension and parks it in the
/// mailbox. The relay decides on its own schedule whether anything gets
/// dispatched, so this handler never touches the sink.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdatePayload>,
) -> Json<AckResponse> {
    let sample = payload.into_sample(now_ms());
    tracing::debug!(
        "POST /update: {} by {} (playing: {})",
        sample.title,
        sample.artist,
        sample.is_playing
    );
    state.mailbox.store(sample);
    Json(AckResponse { status: "ok" })
}

/// POST /clear
///
/// Drops the pending sample and asks the relay to clear the standing
/// presence on its next healthy tick.
pub async fn clear(State(state): State<Arc<AppState>>) -> Json<AckResponse> {
    tracing::debug!("POST /clear");
    state.mailbox.clear();
    state.clear_requested.store(true, Ordering::SeqCst);
    Json(AckResponse { status: "ok" })
}
