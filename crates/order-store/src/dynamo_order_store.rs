use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use domain::events::AttributeValue as ImageValue;
use domain::{Image, OrderRecord, OrderStatus};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::{OrderStore, StoreError};

const KEY_ATTRIBUTE: &str = "orderId";

/// DynamoDB-backed implementation of OrderStore
pub struct DynamoOrderStore {
    client: Client,
    table_name: String,
}

impl DynamoOrderStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key(order_id: &str) -> AttributeValue {
        AttributeValue::S(order_id.to_string())
    }
}

#[async_trait]
impl OrderStore for DynamoOrderStore {
    async fn create(&self, record: &OrderRecord) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(record)))
            .condition_expression("attribute_not_exists(orderId)")
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(order_id = %record.order_id, table = %self.table_name, "Order written");
                Ok(())
            }
            Err(err) => {
                let condition_failed = err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false);

                if condition_failed {
                    Err(StoreError::AlreadyExists(record.order_id.clone()))
                } else {
                    Err(StoreError::Backend(DisplayErrorContext(err).to_string()))
                }
            }
        }
    }

    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let timestamp = AttributeValue::S(at.to_rfc3339());

        let mut update_expression = "SET #status = :to, updatedAt = :timestamp".to_string();
        if to == OrderStatus::Processed {
            update_expression.push_str(", processedAt = :timestamp");
        }

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, Self::key(order_id))
            .update_expression(update_expression)
            .condition_expression("#status = :from")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":from", AttributeValue::S(from.to_string()))
            .expression_attribute_values(":to", AttributeValue::S(to.to_string()))
            .expression_attribute_values(":timestamp", timestamp)
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(order_id = %order_id, from = %from, to = %to, "Order status updated");
                Ok(())
            }
            Err(err) => {
                let condition_failed = err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false);

                if condition_failed {
                    Err(StoreError::ConditionFailed(order_id.to_string()))
                } else {
                    Err(StoreError::Backend(DisplayErrorContext(err).to_string()))
                }
            }
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, Self::key(order_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(e).to_string()))?;

        output.item().map(from_item).transpose()
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError> {
        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(DisplayErrorContext(e).to_string()))?;

            for item in output.items() {
                records.push(from_item(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        debug!(count = records.len(), table = %self.table_name, "Scanned orders");
        Ok(records)
    }
}

/// Convert a record into a DynamoDB item
pub fn to_item(record: &OrderRecord) -> HashMap<String, AttributeValue> {
    record
        .to_image()
        .into_iter()
        .filter_map(|(name, value)| to_sdk_value(value).map(|value| (name, value)))
        .collect()
}

/// Convert a DynamoDB item back into a record
pub fn from_item(item: &HashMap<String, AttributeValue>) -> Result<OrderRecord, StoreError> {
    let image: Image = item
        .iter()
        .filter_map(|(name, value)| from_sdk_value(value).map(|v| (name.clone(), v)))
        .collect();

    Ok(OrderRecord::from_image(&image)?)
}

fn to_sdk_value(value: ImageValue) -> Option<AttributeValue> {
    let value = match value {
        ImageValue::S(s) => AttributeValue::S(s),
        ImageValue::N(n) => AttributeValue::N(n),
        ImageValue::Bool(b) => AttributeValue::Bool(b),
        ImageValue::Null(b) => AttributeValue::Null(b),
        ImageValue::M(map) => AttributeValue::M(
            map.into_iter()
                .filter_map(|(k, v)| to_sdk_value(v).map(|v| (k, v)))
                .collect(),
        ),
        ImageValue::L(list) => AttributeValue::L(list.into_iter().filter_map(to_sdk_value).collect()),
        ImageValue::StringSet(set) => AttributeValue::Ss(set),
        ImageValue::NumberSet(set) => AttributeValue::Ns(set),
        ImageValue::Binary(_) | ImageValue::BinarySet(_) => return None,
    };
    Some(value)
}

fn from_sdk_value(value: &AttributeValue) -> Option<ImageValue> {
    match value {
        AttributeValue::S(s) => Some(ImageValue::S(s.clone())),
        AttributeValue::N(n) => Some(ImageValue::N(n.clone())),
        AttributeValue::Bool(b) => Some(ImageValue::Bool(*b)),
        AttributeValue::Null(b) => Some(ImageValue::Null(*b)),
        AttributeValue::M(map) => Some(ImageValue::M(
            map.iter()
                .filter_map(|(k, v)| from_sdk_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        AttributeValue::L(list) => Some(ImageValue::L(
            list.iter().filter_map(from_sdk_value).collect(),
        )),
        AttributeValue::Ss(set) => Some(ImageValue::StringSet(set.clone())),
        AttributeValue::Ns(set) => Some(ImageValue::NumberSet(set.clone())),
        // Binary attributes are not part of the order schema
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> OrderRecord {
        let now = Utc.with_ymd_and_hms(2025, 10, 18, 10, 0, 0).unwrap();
        OrderRecord::new("order-123".to_string(), "crisps".to_string(), now, 7)
    }

    #[test]
    fn test_item_layout() {
        let record = sample_record();
        let item = to_item(&record);

        assert_eq!(item.get("orderId"), Some(&AttributeValue::S("order-123".to_string())));
        assert_eq!(item.get("snackType"), Some(&AttributeValue::S("crisps".to_string())));
        assert_eq!(item.get("status"), Some(&AttributeValue::S("NEW".to_string())));
        assert_eq!(
            item.get("expiresAt"),
            Some(&AttributeValue::N(record.expires_at.to_string()))
        );
        assert!(item.contains_key("createdAt"));
        assert!(!item.contains_key("processedAt"));
    }

    #[test]
    fn test_item_decodes_back_to_record() {
        let record = sample_record();
        assert_eq!(from_item(&to_item(&record)).unwrap(), record);
    }

    #[test]
    fn test_item_with_unknown_status_fails_to_decode() {
        let mut item = to_item(&sample_record());
        item.insert("status".to_string(), AttributeValue::S("SHIPPED".to_string()));

        assert!(matches!(from_item(&item), Err(StoreError::Decode(_))));
    }
}
