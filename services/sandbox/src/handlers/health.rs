use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// Change-stream records appended so far
    pub stream_length: usize,
    /// Records not yet trimmed from memory
    pub retained_stream_records: usize,
    /// Records already handed to the notifier or dead-lettered
    pub stream_checkpoint: usize,
    pub dead_lettered_records: usize,
}

/// Liveness plus a view of how far the stream driver has caught up
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pipeline = &state.pipeline;

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: "sandbox",
            version: env!("CARGO_PKG_VERSION"),
            stream_length: pipeline.store.stream_len().await,
            retained_stream_records: pipeline.store.retained_stream_len().await,
            stream_checkpoint: pipeline.driver.checkpoint().await,
            dead_lettered_records: pipeline.dead_letters.record_count().await,
        }),
    )
}
