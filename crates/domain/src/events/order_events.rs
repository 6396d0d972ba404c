use crate::aggregates::order::OrderStatus;
use serde::{Deserialize, Serialize};

/// Subject attached to every published status notification
pub const NOTIFICATION_SUBJECT: &str = "Order Processed";

/// Status-change notification published to the topic.
///
/// Carries only the key and the new status; payload fields such as the
/// snack type and timestamps stay out of the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotification {
    pub order_id: String,
    pub status: OrderStatus,
}

impl OrderNotification {
    pub fn processed(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Processed,
        }
    }

    pub fn subject(&self) -> &'static str {
        NOTIFICATION_SUBJECT
    }
}

/// Per-record failure reported back to the stream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Result of processing one stream batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn push_failure(&mut self, sequence_number: impl Into<String>) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: sequence_number.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.batch_item_failures.is_empty()
    }

    /// Sequence number of the earliest reported failure
    pub fn first_failure(&self) -> Option<&str> {
        self.batch_item_failures
            .first()
            .map(|f| f.item_identifier.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_excludes_payload_fields() {
        let notification = OrderNotification::processed("order-123");
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json, serde_json::json!({"orderId": "order-123", "status": "PROCESSED"}));
        assert_eq!(notification.subject(), "Order Processed");
    }

    #[test]
    fn test_batch_response_wire_format() {
        let mut response = BatchResponse::default();
        assert!(response.is_success());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"batchItemFailures": []})
        );

        response.push_failure("222");
        response.push_failure("333");
        assert!(!response.is_success());
        assert_eq!(response.first_failure(), Some("222"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"batchItemFailures": [{"itemIdentifier": "222"}, {"itemIdentifier": "333"}]})
        );
    }
}
