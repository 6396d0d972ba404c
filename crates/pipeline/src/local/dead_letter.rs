use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::config::DeadLetterConfig;
use domain::StreamRecord;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeadLetterReason {
    RetryAttemptsExhausted,
    RecordAgeExceeded,
}

/// Records the stream source gave up on, with the failure metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub reason: DeadLetterReason,
    pub attempts: u32,
    pub first_sequence_number: Option<String>,
    pub last_sequence_number: Option<String>,
    pub dead_lettered_at: DateTime<Utc>,
    pub records: Vec<StreamRecord>,
}

impl DeadLetterEntry {
    pub fn new(
        reason: DeadLetterReason,
        attempts: u32,
        records: Vec<StreamRecord>,
        at: DateTime<Utc>,
    ) -> Self {
        let first_sequence_number = records
            .first()
            .and_then(|r| r.sequence_number())
            .map(str::to_string);
        let last_sequence_number = records
            .last()
            .and_then(|r| r.sequence_number())
            .map(str::to_string);

        Self {
            reason,
            attempts,
            first_sequence_number,
            last_sequence_number,
            dead_lettered_at: at,
            records,
        }
    }
}

/// In-memory stand-in for the failure destination queue
#[derive(Default)]
pub struct DeadLetterQueue {
    config: DeadLetterConfig,
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new(config: DeadLetterConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    pub async fn push(&self, entry: DeadLetterEntry) {
        warn!(
            reason = ?entry.reason,
            attempts = entry.attempts,
            records = entry.records.len(),
            first_sequence_number = ?entry.first_sequence_number,
            "Records sent to dead-letter queue"
        );
        self.entries.lock().await.push(entry);
    }

    pub async fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().await.clone()
    }

    /// Total number of stream records held across all entries
    pub async fn record_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.records.len())
            .sum()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop entries older than the retention period
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = ChronoDuration::from_std(self.config.retention)
            .unwrap_or_else(|_| ChronoDuration::days(14));
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| now - e.dead_lettered_at < retention);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EventName, StreamChange};

    fn record(sequence: &str) -> StreamRecord {
        StreamRecord {
            event_id: None,
            event_name: EventName::Insert,
            event_version: None,
            event_source: None,
            change: StreamChange {
                sequence_number: Some(sequence.to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_entry_metadata() {
        let entry = DeadLetterEntry::new(
            DeadLetterReason::RetryAttemptsExhausted,
            4,
            vec![record("1"), record("2"), record("3")],
            Utc::now(),
        );

        assert_eq!(entry.first_sequence_number.as_deref(), Some("1"));
        assert_eq!(entry.last_sequence_number.as_deref(), Some("3"));
        assert_eq!(entry.attempts, 4);
    }

    #[tokio::test]
    async fn test_purge_expired_respects_retention() {
        let queue = DeadLetterQueue::new(DeadLetterConfig::default());
        let now = Utc::now();

        queue
            .push(DeadLetterEntry::new(
                DeadLetterReason::RecordAgeExceeded,
                0,
                vec![record("1")],
                now - ChronoDuration::days(15),
            ))
            .await;
        queue
            .push(DeadLetterEntry::new(
                DeadLetterReason::RetryAttemptsExhausted,
                4,
                vec![record("2"), record("3")],
                now - ChronoDuration::days(1),
            ))
            .await;

        assert_eq!(queue.record_count().await, 3);
        assert_eq!(queue.purge_expired(now).await, 1);
        assert_eq!(queue.len().await, 1);
        assert_eq!(
            queue.entries().await[0].first_sequence_number.as_deref(),
            Some("2")
        );
    }
}
