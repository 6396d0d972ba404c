use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client;
use domain::OrderNotification;
use tracing::{info, warn};

use crate::{NotificationPublisher, PublisherError};

/// SNS topic publisher for order status notifications
pub struct SnsPublisher {
    client: Client,
    topic_arn: String,
}

impl SnsPublisher {
    /// Create a new SnsPublisher
    ///
    /// # Arguments
    /// * `client` - A configured SNS client
    /// * `topic_arn` - ARN of the topic notifications are published to
    pub fn new(client: Client, topic_arn: impl Into<String>) -> Self {
        let topic_arn = topic_arn.into();
        info!("SNS publisher created for topic: {}", topic_arn);
        Self { client, topic_arn }
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }
}

#[async_trait]
impl NotificationPublisher for SnsPublisher {
    async fn publish(&self, notification: &OrderNotification) -> Result<String, PublisherError> {
        let message = serde_json::to_string(notification)?;

        match self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .subject(notification.subject())
            .send()
            .await
        {
            Ok(output) => {
                let message_id = output.message_id().unwrap_or_default().to_string();
                info!(
                    order_id = %notification.order_id,
                    message_id = %message_id,
                    "Notification published to topic '{}'",
                    self.topic_arn
                );
                Ok(message_id)
            }
            Err(err) => {
                let err = DisplayErrorContext(err).to_string();
                warn!(order_id = %notification.order_id, "Failed to publish notification: {}", err);
                Err(PublisherError::PublishFailed(err))
            }
        }
    }
}
