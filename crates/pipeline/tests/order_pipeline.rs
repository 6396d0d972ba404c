use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::config::StreamSourceConfig;
use domain::{OrderNotification, OrderRecord, OrderStatus, StreamEvent};
use messaging::{InMemoryPublisher, NotificationPublisher, PublisherError};
use order_store::{InMemoryOrderStore, OrderStore, StoreError};
use pipeline::api::handle_intake_event;
use pipeline::local::{DeadLetterQueue, DeadLetterReason, LocalPipeline, LocalStreamDriver};
use pipeline::ChangeNotifier;
use serde_json::json;
use std::sync::{Arc, Mutex};

// Publisher that fails a fixed number of times before forwarding to the topic
struct FlakyPublisher {
    topic: Arc<InMemoryPublisher>,
    failures_remaining: Mutex<u32>,
}

impl FlakyPublisher {
    fn new(topic: Arc<InMemoryPublisher>, failures: u32) -> Self {
        Self {
            topic,
            failures_remaining: Mutex::new(failures),
        }
    }
}

#[async_trait]
impl NotificationPublisher for FlakyPublisher {
    async fn publish(&self, notification: &OrderNotification) -> Result<String, PublisherError> {
        {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PublisherError::PublishFailed("topic throttled".to_string()));
            }
        }
        self.topic.publish(notification).await
    }
}

// Table whose conditional updates always fail with a backend error
struct UnavailableUpdates {
    inner: Arc<InMemoryOrderStore>,
}

#[async_trait]
impl OrderStore for UnavailableUpdates {
    async fn create(&self, record: &OrderRecord) -> Result<(), StoreError> {
        self.inner.create(record).await
    }

    async fn transition(
        &self,
        _order_id: &str,
        _from: OrderStatus,
        _to: OrderStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("ProvisionedThroughputExceededException".to_string()))
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        self.inner.get(order_id).await
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_order_flows_from_intake_to_notification() -> anyhow::Result<()> {
    let pipeline = LocalPipeline::new(7, StreamSourceConfig::default());

    let response = handle_intake_event(
        &pipeline.intake,
        json!({"orderId": "order-1", "snackType": "crisps"}),
    )
    .await?;
    assert_eq!(response.status_code, 201);

    let stored = pipeline.store.get("order-1").await?.expect("order stored");
    assert_eq!(stored.status, OrderStatus::New);
    assert_eq!(stored.snack_type, "crisps");

    let report = pipeline.tick(Utc::now()).await;
    assert_eq!(report.dead_lettered, 0);

    let processed = pipeline.store.get("order-1").await?.expect("order stored");
    assert_eq!(processed.status, OrderStatus::Processed);
    assert!(processed.processed_at.is_some());
    assert_eq!(processed.updated_at, processed.processed_at);
    assert_eq!(processed.created_at, stored.created_at);

    let published = pipeline.publisher.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "Order Processed");
    assert_eq!(
        serde_json::to_value(&published[0].message)?,
        json!({"orderId": "order-1", "status": "PROCESSED"})
    );

    Ok(())
}

#[tokio::test]
async fn test_replayed_insert_sends_no_second_notification() -> anyhow::Result<()> {
    let pipeline = LocalPipeline::new(7, StreamSourceConfig::default());
    pipeline
        .intake
        .handle(&json!({"orderId": "order-2", "snackType": "nuts"}))
        .await?;

    let insert = pipeline.store.read_stream(0, 1).await;
    pipeline.tick(Utc::now()).await;

    // Redeliver the same INSERT as the platform would after a lost checkpoint
    let response = pipeline
        .notifier
        .process_batch(&StreamEvent { records: insert })
        .await;

    assert!(response.is_success());
    assert_eq!(pipeline.publisher.published_for("order-2").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_and_invalid_requests_leave_table_unchanged() -> anyhow::Result<()> {
    let pipeline = LocalPipeline::new(7, StreamSourceConfig::default());
    let request = json!({"orderId": "order-3", "snackType": "biscuits"});

    assert_eq!(handle_intake_event(&pipeline.intake, request.clone()).await?.status_code, 201);
    assert_eq!(handle_intake_event(&pipeline.intake, request).await?.status_code, 409);
    assert_eq!(
        handle_intake_event(&pipeline.intake, json!({"snackType": "crisps"}))
            .await?
            .status_code,
        400
    );

    assert_eq!(pipeline.store.stream_len().await, 1);
    pipeline.tick(Utc::now()).await;
    assert_eq!(pipeline.publisher.published().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_publish_failure_after_update_is_not_renotified() -> anyhow::Result<()> {
    let topic = Arc::new(InMemoryPublisher::new());
    let flaky = Arc::new(FlakyPublisher::new(topic.clone(), 1));
    let pipeline = LocalPipeline::with_publisher(7, StreamSourceConfig::default(), topic, flaky);

    pipeline
        .intake
        .handle(&json!({"orderId": "order-4", "snackType": "crisps"}))
        .await?;
    let report = pipeline.tick(Utc::now()).await;

    // The retry finds the order already PROCESSED and treats it as done;
    // the MODIFY from the status update is delivered afterwards
    assert_eq!(report.records, 2);
    assert_eq!(report.failed_invocations, 1);
    assert_eq!(report.invocations, 3);
    assert_eq!(report.dead_lettered, 0);

    let order = pipeline.store.get("order-4").await?.expect("order stored");
    assert_eq!(order.status, OrderStatus::Processed);
    assert!(pipeline.publisher.published().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_persistent_failure_ends_in_dead_letter_queue() -> anyhow::Result<()> {
    let table = Arc::new(InMemoryOrderStore::new());
    let topic = Arc::new(InMemoryPublisher::new());
    let notifier = Arc::new(ChangeNotifier::new(
        Arc::new(UnavailableUpdates { inner: table.clone() }),
        topic.clone(),
    ));
    let dead_letters = Arc::new(DeadLetterQueue::default());
    let driver = LocalStreamDriver::new(
        table.clone(),
        notifier,
        dead_letters.clone(),
        StreamSourceConfig::default(),
    );

    table
        .create(&OrderRecord::new("order-5".to_string(), "crisps".to_string(), Utc::now(), 7))
        .await?;
    let report = driver.poll().await;

    assert_eq!(report.invocations, 4);
    let entries = dead_letters.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, DeadLetterReason::RetryAttemptsExhausted);
    assert_eq!(entries[0].attempts, 4);
    assert_eq!(entries[0].first_sequence_number, entries[0].last_sequence_number);

    let order = table.get("order-5").await?.expect("order stored");
    assert_eq!(order.status, OrderStatus::New);
    assert!(topic.published().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_expired_order_removal_is_ignored_by_notifier() -> anyhow::Result<()> {
    let pipeline = LocalPipeline::new(7, StreamSourceConfig::default());
    pipeline
        .intake
        .handle(&json!({"orderId": "order-6", "snackType": "chocolate"}))
        .await?;
    pipeline.tick(Utc::now()).await;

    let report = pipeline.tick(Utc::now() + Duration::days(8)).await;

    assert_eq!(report.records, 1);
    assert_eq!(report.dead_lettered, 0);
    assert!(pipeline.store.get("order-6").await?.is_none());
    assert_eq!(pipeline.publisher.published().await.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_deliveries_of_one_insert_notify_once() -> anyhow::Result<()> {
    let table = Arc::new(InMemoryOrderStore::new());
    let topic = Arc::new(InMemoryPublisher::new());
    let notifier = Arc::new(ChangeNotifier::new(table.clone(), topic.clone()));

    table
        .create(&OrderRecord::new("order-7".to_string(), "crisps".to_string(), Utc::now(), 7))
        .await?;
    let event = StreamEvent {
        records: table.read_stream(0, 1).await,
    };

    let first = tokio::spawn({
        let notifier = notifier.clone();
        let event = event.clone();
        async move { notifier.process_batch(&event).await }
    });
    let second = tokio::spawn({
        let notifier = notifier.clone();
        let event = event.clone();
        async move { notifier.process_batch(&event).await }
    });
    let (first, second) = tokio::join!(first, second);

    assert!(first?.is_success());
    assert!(second?.is_success());
    assert_eq!(topic.published_for("order-7").await.len(), 1);

    let order = table.get("order-7").await?.expect("order stored");
    assert_eq!(order.status, OrderStatus::Processed);
    Ok(())
}
