use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{AttributeValue, EventName, Image, OrderRecord, OrderStatus, StreamChange, StreamRecord};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{OrderStore, StoreError};

const STREAM_VIEW_TYPE: &str = "NEW_AND_OLD_IMAGES";

/// In-process order table with an append-only change stream.
///
/// Writes follow the same conditional rules as the DynamoDB table, and
/// every mutation appends a stream record carrying new and old images.
/// Records past their `expiresAt` are only removed by `expire`.
#[derive(Default)]
pub struct InMemoryOrderStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<String, OrderRecord>,
    stream: Vec<StreamRecord>,
    /// Records already dropped from the front of `stream`
    trimmed: usize,
}

impl Inner {
    fn append(
        &mut self,
        event_name: EventName,
        order_id: &str,
        new_image: Option<Image>,
        old_image: Option<Image>,
        at: DateTime<Utc>,
    ) {
        let sequence_number = format_sequence((self.trimmed + self.stream.len()) as u64 + 1);

        let mut keys = Image::new();
        keys.insert("orderId".to_string(), AttributeValue::S(order_id.to_string()));

        debug!(
            order_id = %order_id,
            event_name = event_name.as_str(),
            sequence_number = %sequence_number,
            "Appending change stream record"
        );

        self.stream.push(StreamRecord {
            event_id: Some(Uuid::new_v4().simple().to_string()),
            event_name,
            event_version: Some("1.1".to_string()),
            event_source: Some("aws:dynamodb".to_string()),
            change: StreamChange {
                sequence_number: Some(sequence_number),
                keys: Some(keys),
                new_image,
                old_image,
                stream_view_type: Some(STREAM_VIEW_TYPE.to_string()),
                approximate_creation_date_time: Some(at.timestamp() as f64),
            },
        });
    }
}

/// Zero-padded so lexical order matches stream order
fn format_sequence(n: u64) -> String {
    format!("{:021}", n)
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream records starting at absolute `position`, at most `limit` of them.
    ///
    /// Positions count every record ever appended; trimmed records are gone,
    /// so reading below the retained window starts at its first record.
    pub async fn read_stream(&self, position: usize, limit: usize) -> Vec<StreamRecord> {
        let inner = self.inner.lock().await;
        inner
            .stream
            .iter()
            .skip(position.saturating_sub(inner.trimmed))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records appended to the change stream so far
    pub async fn stream_len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.trimmed + inner.stream.len()
    }

    /// Number of records still held in memory
    pub async fn retained_stream_len(&self) -> usize {
        self.inner.lock().await.stream.len()
    }

    /// Drop stream records below absolute `position`, typically the
    /// consumer's checkpoint. Returns how many were dropped.
    pub async fn trim_stream(&self, position: usize) -> usize {
        let mut inner = self.inner.lock().await;
        let count = position.saturating_sub(inner.trimmed).min(inner.stream.len());
        if count > 0 {
            inner.stream.drain(..count);
            inner.trimmed += count;
            debug!(count, retained = inner.stream.len(), "Trimmed change stream");
        }
        count
    }

    /// Delete every record whose expiry has passed, as the TTL sweeper would
    pub async fn expire(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().await;

        let expired: Vec<String> = inner
            .orders
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.order_id.clone())
            .collect();

        for order_id in &expired {
            if let Some(record) = inner.orders.remove(order_id) {
                let old_image = record.to_image();
                inner.append(EventName::Remove, order_id, None, Some(old_image), now);
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired orders removed");
        }
        expired.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, record: &OrderRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        if inner.orders.contains_key(&record.order_id) {
            return Err(StoreError::AlreadyExists(record.order_id.clone()));
        }

        inner
            .orders
            .insert(record.order_id.clone(), record.clone());
        inner.append(
            EventName::Insert,
            &record.order_id,
            Some(record.to_image()),
            None,
            record.created_at,
        );
        Ok(())
    }

    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        let record = match inner.orders.get_mut(order_id) {
            Some(record) if record.status == from => record,
            _ => return Err(StoreError::ConditionFailed(order_id.to_string())),
        };

        let old_image = record.to_image();
        record.transition(to, at).map_err(StoreError::Lifecycle)?;
        let new_image = record.to_image();

        inner.append(EventName::Modify, order_id, Some(new_image), Some(old_image), at);
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.inner.lock().await.orders.get(order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(self.inner.lock().await.orders.values().cloned().collect())
    }
}
