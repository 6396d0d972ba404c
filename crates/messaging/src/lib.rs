pub mod memory_publisher;
pub mod sns_publisher;

pub use memory_publisher::{InMemoryPublisher, PublishedNotification};
pub use sns_publisher::SnsPublisher;

use async_trait::async_trait;
use domain::{OrderNotification, PipelineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to serialize notification: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish notification: {0}")]
    PublishFailed(String),
}

impl From<PublisherError> for PipelineError {
    fn from(err: PublisherError) -> Self {
        match err {
            PublisherError::Serialization(e) => PipelineError::PermanentProcessing(e.to_string()),
            PublisherError::PublishFailed(msg) => PipelineError::TransientDependency(msg),
        }
    }
}

/// Notification topic the order status changes are published to
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publish one notification, returning the message id assigned by the topic
    async fn publish(&self, notification: &OrderNotification) -> Result<String, PublisherError>;
}
