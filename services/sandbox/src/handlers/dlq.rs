use axum::{extract::State, Json};
use pipeline::local::DeadLetterEntry;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterResponse {
    /// Stream records across all entries
    pub count: usize,
    pub entries: Vec<DeadLetterEntry>,
}

pub async fn list_dead_letters(State(state): State<AppState>) -> Json<DeadLetterResponse> {
    let entries = state.pipeline.dead_letters.entries().await;
    let count = entries.iter().map(|e| e.records.len()).sum();

    Json(DeadLetterResponse { count, entries })
}
