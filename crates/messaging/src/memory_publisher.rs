use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::OrderNotification;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{NotificationPublisher, PublisherError};

/// A notification as observed by a topic subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedNotification {
    pub message_id: String,
    pub subject: String,
    pub message: OrderNotification,
    pub published_at: DateTime<Utc>,
}

/// Topic stand-in that keeps every published notification in memory
#[derive(Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<PublishedNotification>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<PublishedNotification> {
        self.published.lock().await.clone()
    }

    /// Notifications published for one order, oldest first
    pub async fn published_for(&self, order_id: &str) -> Vec<PublishedNotification> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|n| n.message.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryPublisher {
    async fn publish(&self, notification: &OrderNotification) -> Result<String, PublisherError> {
        let message_id = Uuid::new_v4().to_string();

        self.published.lock().await.push(PublishedNotification {
            message_id: message_id.clone(),
            subject: notification.subject().to_string(),
            message: notification.clone(),
            published_at: Utc::now(),
        });

        debug!(order_id = %notification.order_id, message_id = %message_id, "Notification recorded");
        Ok(message_id)
    }
}
