use async_trait::async_trait;
use chrono::Utc;
use common::metrics;
use domain::{
    AttributeValue, BatchResponse, EventName, OrderNotification, OrderStatus, PipelineError,
    StreamEvent, StreamRecord,
};
use messaging::NotificationPublisher;
use order_store::{OrderStore, StoreError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Why a stream record was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotInsert(EventName),
    NoNewImage,
    MissingOrderId,
    /// Raw status string; `None` when absent or not a string attribute
    NotNew(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Status moved to PROCESSED and one notification published
    Processed { order_id: String, message_id: String },
    /// The conditional update found the order no longer NEW
    AlreadyProcessed { order_id: String },
    Skipped(SkipReason),
}

impl RecordOutcome {
    fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Processed { .. } => "processed",
            RecordOutcome::AlreadyProcessed { .. } => "already_processed",
            RecordOutcome::Skipped(_) => "skipped",
        }
    }
}

/// Consumer of change-stream batches
#[async_trait]
pub trait StreamBatchHandler: Send + Sync {
    async fn handle_batch(&self, event: &StreamEvent) -> BatchResponse;
}

/// Change notifier: moves freshly inserted orders to PROCESSED and announces them.
///
/// Stateless between invocations; safe to run concurrently for different
/// batches. Redelivered records are no-ops because the status update is
/// conditional on the order still being NEW.
pub struct ChangeNotifier {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn NotificationPublisher>,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn OrderStore>, publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Process a batch in delivery order, reporting failed records by sequence number
    pub async fn process_batch(&self, event: &StreamEvent) -> BatchResponse {
        let started = Instant::now();
        let mut response = BatchResponse::default();

        for record in &event.records {
            let event_name = record.event_name.as_str();

            match self.process_record(record).await {
                Ok(outcome) => {
                    metrics::record_stream_record(event_name, outcome.label());
                }
                Err(e) => {
                    metrics::record_stream_record(event_name, "failed");
                    match record.sequence_number() {
                        Some(sequence_number) => {
                            error!(
                                sequence_number = %sequence_number,
                                error_kind = e.kind(),
                                "Error processing record: {}",
                                e
                            );
                            response.push_failure(sequence_number);
                        }
                        None => {
                            error!(error_kind = e.kind(), "Error processing record without sequence number: {}", e);
                        }
                    }
                }
            }
        }

        metrics::record_batch(started.elapsed().as_secs_f64());
        info!(
            records = event.records.len(),
            failures = response.batch_item_failures.len(),
            "Stream batch processed"
        );

        response
    }

    /// Handle a single change-stream record
    pub async fn process_record(&self, record: &StreamRecord) -> Result<RecordOutcome, PipelineError> {
        let sequence_number = record.sequence_number().unwrap_or("-");

        if record.event_name != EventName::Insert {
            info!(
                sequence_number = %sequence_number,
                "Skipping event type: {}",
                record.event_name.as_str()
            );
            return Ok(RecordOutcome::Skipped(SkipReason::NotInsert(record.event_name)));
        }

        let image = match record.new_image() {
            Some(image) => image,
            None => {
                warn!(sequence_number = %sequence_number, "No new image in record");
                return Ok(RecordOutcome::Skipped(SkipReason::NoNewImage));
            }
        };

        let order_id = match image.get("orderId").and_then(AttributeValue::as_s) {
            Some(order_id) if !order_id.is_empty() => order_id,
            _ => {
                warn!(sequence_number = %sequence_number, "Missing orderId in record");
                return Ok(RecordOutcome::Skipped(SkipReason::MissingOrderId));
            }
        };

        let status = image.get("status").and_then(AttributeValue::as_s);
        if status != Some(OrderStatus::New.as_str()) {
            info!(order_id = %order_id, status = ?image.get("status"), "Skipping order that is not NEW");
            return Ok(RecordOutcome::Skipped(SkipReason::NotNew(status.map(str::to_string))));
        }

        match self
            .store
            .transition(order_id, OrderStatus::New, OrderStatus::Processed, Utc::now())
            .await
        {
            Ok(()) => {
                info!(order_id = %order_id, "Updated order to PROCESSED");
            }
            Err(StoreError::ConditionFailed(_)) => {
                info!(order_id = %order_id, "Order already processed, skipping");
                return Ok(RecordOutcome::AlreadyProcessed {
                    order_id: order_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let notification = OrderNotification::processed(order_id);
        let message_id = self.publisher.publish(&notification).await?;
        metrics::record_notification(notification.status.as_str());
        info!(order_id = %order_id, message_id = %message_id, "Published notification");

        Ok(RecordOutcome::Processed {
            order_id: order_id.to_string(),
            message_id,
        })
    }
}

#[async_trait]
impl StreamBatchHandler for ChangeNotifier {
    async fn handle_batch(&self, event: &StreamEvent) -> BatchResponse {
        self.process_batch(event).await
    }
}
