use chrono::{DateTime, Utc};
use common::config::StreamSourceConfig;
use common::metrics;
use domain::{StreamEvent, StreamRecord};
use order_store::InMemoryOrderStore;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::dead_letter::{DeadLetterEntry, DeadLetterQueue, DeadLetterReason};
use crate::notifier::StreamBatchHandler;

/// Summary of one `poll` over the change stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    /// Handler invocations, retries included
    pub invocations: usize,
    /// Records read from the stream
    pub records: usize,
    /// Invocations that reported at least one failed record
    pub failed_invocations: usize,
    pub dead_lettered: usize,
}

impl DeliveryReport {
    pub fn is_idle(&self) -> bool {
        self.records == 0
    }
}

/// Event-source mapping emulation between the in-memory change stream and a batch handler.
///
/// Records are read in order from a checkpoint. A batch whose handler
/// reports failures is retried from the first failed sequence number;
/// earlier records in the batch count as delivered. Once the retry budget
/// is spent the remaining records go to the dead-letter queue and the
/// checkpoint moves past them.
pub struct LocalStreamDriver {
    store: Arc<InMemoryOrderStore>,
    handler: Arc<dyn StreamBatchHandler>,
    dead_letters: Arc<DeadLetterQueue>,
    config: StreamSourceConfig,
    checkpoint: Mutex<usize>,
}

impl LocalStreamDriver {
    pub fn new(
        store: Arc<InMemoryOrderStore>,
        handler: Arc<dyn StreamBatchHandler>,
        dead_letters: Arc<DeadLetterQueue>,
        config: StreamSourceConfig,
    ) -> Self {
        Self {
            store,
            handler,
            dead_letters,
            config,
            checkpoint: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &StreamSourceConfig {
        &self.config
    }

    /// Position of the next unread stream record
    pub async fn checkpoint(&self) -> usize {
        *self.checkpoint.lock().await
    }

    /// Deliver everything currently on the stream
    pub async fn poll(&self) -> DeliveryReport {
        self.poll_at(Utc::now()).await
    }

    /// Deliver everything currently on the stream, judging record age against `now`
    pub async fn poll_at(&self, now: DateTime<Utc>) -> DeliveryReport {
        // Held for the whole poll so concurrent pollers never deliver a record twice
        let mut checkpoint = self.checkpoint.lock().await;
        let mut report = DeliveryReport::default();

        loop {
            let batch = self.store.read_stream(*checkpoint, self.config.batch_size).await;
            if batch.is_empty() {
                break;
            }

            *checkpoint += batch.len();
            report.records += batch.len();

            let (fresh, stale): (Vec<StreamRecord>, Vec<StreamRecord>) =
                batch.into_iter().partition(|r| !self.is_too_old(r, now));

            if !stale.is_empty() {
                self.dead_letter(DeadLetterReason::RecordAgeExceeded, 0, stale, now, &mut report)
                    .await;
            }

            if !fresh.is_empty() {
                self.deliver(fresh, now, &mut report).await;
            }
        }

        if !report.is_idle() {
            info!(
                records = report.records,
                invocations = report.invocations,
                dead_lettered = report.dead_lettered,
                checkpoint = *checkpoint,
                "Change stream delivered"
            );
        }

        report
    }

    async fn deliver(&self, batch: Vec<StreamRecord>, now: DateTime<Utc>, report: &mut DeliveryReport) {
        let mut pending: VecDeque<(Vec<StreamRecord>, u32)> = VecDeque::new();
        pending.push_back((batch, 0));

        while let Some((mut records, attempts)) = pending.pop_front() {
            report.invocations += 1;
            let response = self
                .handler
                .handle_batch(&StreamEvent {
                    records: records.clone(),
                })
                .await;

            let first_failure = match response.first_failure() {
                None => continue,
                Some(identifier) => identifier.to_string(),
            };
            report.failed_invocations += 1;

            // An identifier outside the batch fails the whole batch
            let index = records
                .iter()
                .position(|r| r.sequence_number() == Some(first_failure.as_str()))
                .unwrap_or(0);
            let remaining = records.split_off(index);
            let attempts = attempts + 1;

            debug!(
                first_failure = %first_failure,
                attempts,
                remaining = remaining.len(),
                "Batch reported failures"
            );

            if attempts > self.config.retry_attempts {
                self.dead_letter(
                    DeadLetterReason::RetryAttemptsExhausted,
                    attempts,
                    remaining,
                    now,
                    report,
                )
                .await;
            } else if self.config.bisect_batch_on_error && remaining.len() > 1 {
                let mut first = remaining;
                let second = first.split_off(first.len() / 2);
                pending.push_front((second, attempts));
                pending.push_front((first, attempts));
            } else {
                pending.push_front((remaining, attempts));
            }
        }
    }

    async fn dead_letter(
        &self,
        reason: DeadLetterReason,
        attempts: u32,
        records: Vec<StreamRecord>,
        now: DateTime<Utc>,
        report: &mut DeliveryReport,
    ) {
        if reason == DeadLetterReason::RecordAgeExceeded {
            warn!(count = records.len(), "Stream records exceeded maximum age");
        }
        report.dead_lettered += records.len();
        metrics::record_dead_letters(records.len());
        self.dead_letters
            .push(DeadLetterEntry::new(reason, attempts, records, now))
            .await;
    }

    fn is_too_old(&self, record: &StreamRecord, now: DateTime<Utc>) -> bool {
        match record.change.approximate_creation_date_time {
            Some(created) => {
                let age = now.timestamp() as f64 - created;
                age > self.config.max_record_age.as_secs_f64()
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use domain::{BatchResponse, OrderRecord};
    use order_store::OrderStore;
    use std::collections::HashSet;

    /// Fails every record whose order id is in `failing`, recording each invocation
    #[derive(Default)]
    struct ScriptedHandler {
        failing: Mutex<HashSet<String>>,
        invocations: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedHandler {
        async fn fail(&self, order_id: &str) {
            self.failing.lock().await.insert(order_id.to_string());
        }

        async fn heal(&self, order_id: &str) {
            self.failing.lock().await.remove(order_id);
        }

        async fn invocations(&self) -> Vec<Vec<String>> {
            self.invocations.lock().await.clone()
        }
    }

    fn order_id(record: &StreamRecord) -> String {
        record
            .change
            .keys
            .as_ref()
            .and_then(|k| k.get("orderId"))
            .and_then(|v| v.as_s())
            .unwrap_or_default()
            .to_string()
    }

    #[async_trait]
    impl StreamBatchHandler for ScriptedHandler {
        async fn handle_batch(&self, event: &StreamEvent) -> BatchResponse {
            let failing = self.failing.lock().await.clone();
            self.invocations
                .lock()
                .await
                .push(event.records.iter().map(order_id).collect());

            let mut response = BatchResponse::default();
            for record in &event.records {
                if failing.contains(&order_id(record)) {
                    response.push_failure(record.sequence_number().unwrap_or_default());
                }
            }
            response
        }
    }

    async fn seeded_store(count: usize) -> Arc<InMemoryOrderStore> {
        let store = Arc::new(InMemoryOrderStore::new());
        for i in 1..=count {
            store
                .create(&OrderRecord::new(format!("order-{}", i), "crisps".to_string(), Utc::now(), 7))
                .await
                .unwrap();
        }
        store
    }

    fn driver(
        store: Arc<InMemoryOrderStore>,
        handler: Arc<ScriptedHandler>,
        config: StreamSourceConfig,
    ) -> (LocalStreamDriver, Arc<DeadLetterQueue>) {
        let dead_letters = Arc::new(DeadLetterQueue::default());
        (
            LocalStreamDriver::new(store, handler, dead_letters.clone(), config),
            dead_letters,
        )
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let store = seeded_store(25).await;
        let handler = Arc::new(ScriptedHandler::default());
        let (driver, _) = driver(store, handler.clone(), StreamSourceConfig::default());

        let report = driver.poll().await;

        assert_eq!(report.records, 25);
        assert_eq!(report.invocations, 3);
        let sizes: Vec<usize> = handler.invocations().await.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(driver.checkpoint().await, 25);

        assert!(driver.poll().await.is_idle());
    }

    #[tokio::test]
    async fn test_retry_resumes_from_first_failure() {
        let store = seeded_store(3).await;
        let handler = Arc::new(ScriptedHandler::default());
        handler.fail("order-2").await;
        let config = StreamSourceConfig {
            bisect_batch_on_error: false,
            ..Default::default()
        };
        let (driver, dead_letters) = driver(store, handler.clone(), config);

        let report = driver.poll().await;

        // One initial attempt plus three retries, each starting at order-2
        assert_eq!(report.invocations, 4);
        let invocations = handler.invocations().await;
        assert_eq!(invocations[0], vec!["order-1", "order-2", "order-3"]);
        for retry in &invocations[1..] {
            assert_eq!(retry, &vec!["order-2".to_string(), "order-3".to_string()]);
        }

        let entries = dead_letters.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, DeadLetterReason::RetryAttemptsExhausted);
        assert_eq!(entries[0].attempts, 4);
        assert_eq!(entries[0].records.len(), 2);
        assert_eq!(report.dead_lettered, 2);
    }

    #[tokio::test]
    async fn test_bisect_isolates_failing_record() {
        let store = seeded_store(4).await;
        let handler = Arc::new(ScriptedHandler::default());
        handler.fail("order-1").await;
        let (driver, dead_letters) = driver(store, handler.clone(), StreamSourceConfig::default());

        driver.poll().await;

        let entries = dead_letters.entries().await;
        let dead: Vec<String> = entries
            .iter()
            .flat_map(|e| e.records.iter().map(order_id))
            .collect();
        assert_eq!(dead, vec!["order-1"]);

        // order-2..4 were handed over again after the split and succeeded
        let invocations = handler.invocations().await;
        assert!(invocations.iter().any(|batch| batch == &vec!["order-3".to_string(), "order-4".to_string()]));
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_without_dead_letter() {
        let store = seeded_store(1).await;
        let handler = Arc::new(ScriptedHandler::default());
        handler.fail("order-1").await;
        let (driver, dead_letters) = driver(store.clone(), handler.clone(), StreamSourceConfig::default());

        driver.poll().await;
        assert_eq!(dead_letters.record_count().await, 1);

        handler.heal("order-1").await;
        store
            .create(&OrderRecord::new("order-2".to_string(), "nuts".to_string(), Utc::now(), 7))
            .await
            .unwrap();
        let report = driver.poll().await;
        assert_eq!(report.invocations, 1);
        assert_eq!(report.dead_lettered, 0);
    }

    #[tokio::test]
    async fn test_records_past_max_age_are_dead_lettered() {
        let store = seeded_store(2).await;
        let handler = Arc::new(ScriptedHandler::default());
        let (driver, dead_letters) = driver(store, handler.clone(), StreamSourceConfig::default());

        let report = driver.poll_at(Utc::now() + ChronoDuration::hours(2)).await;

        assert_eq!(report.invocations, 0);
        assert_eq!(report.dead_lettered, 2);
        let entries = dead_letters.entries().await;
        assert_eq!(entries[0].reason, DeadLetterReason::RecordAgeExceeded);
        assert!(handler.invocations().await.is_empty());
    }
}
