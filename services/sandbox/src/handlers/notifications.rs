use axum::{extract::State, Json};
use messaging::PublishedNotification;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub count: usize,
    pub notifications: Vec<PublishedNotification>,
}

/// Everything published to the in-memory topic, oldest first
pub async fn list_notifications(State(state): State<AppState>) -> Json<NotificationsResponse> {
    let notifications = state.pipeline.publisher.published().await;

    Json(NotificationsResponse {
        count: notifications.len(),
        notifications,
    })
}
