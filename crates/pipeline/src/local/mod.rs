//! In-process platform: order table with change stream, topic, stream source
//! mapping and dead-letter queue, wired to the real handlers.

pub mod dead_letter;
pub mod driver;

pub use dead_letter::{DeadLetterEntry, DeadLetterQueue, DeadLetterReason};
pub use driver::{DeliveryReport, LocalStreamDriver};

use chrono::{DateTime, Utc};
use common::config::{DeadLetterConfig, StreamSourceConfig};
use messaging::{InMemoryPublisher, NotificationPublisher};
use order_store::InMemoryOrderStore;
use std::sync::Arc;

use crate::intake::OrderIntake;
use crate::notifier::{ChangeNotifier, StreamBatchHandler};

/// Every component of the local platform, sharing one table and one topic
pub struct LocalPipeline {
    pub store: Arc<InMemoryOrderStore>,
    pub publisher: Arc<InMemoryPublisher>,
    pub intake: Arc<OrderIntake>,
    pub notifier: Arc<ChangeNotifier>,
    pub dead_letters: Arc<DeadLetterQueue>,
    pub driver: Arc<LocalStreamDriver>,
}

impl LocalPipeline {
    pub fn new(ttl_days: u32, stream: StreamSourceConfig) -> Self {
        let publisher = Arc::new(InMemoryPublisher::new());
        Self::with_publisher(ttl_days, stream, publisher.clone(), publisher)
    }

    /// Build around an in-memory topic while the notifier publishes through
    /// `notifier_publisher`, typically a wrapper that forwards to that topic.
    pub fn with_publisher(
        ttl_days: u32,
        stream: StreamSourceConfig,
        publisher: Arc<InMemoryPublisher>,
        notifier_publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let intake = Arc::new(OrderIntake::new(store.clone(), ttl_days));
        let notifier = Arc::new(ChangeNotifier::new(store.clone(), notifier_publisher));
        let dead_letters = Arc::new(DeadLetterQueue::new(DeadLetterConfig::default()));

        let handler: Arc<dyn StreamBatchHandler> = notifier.clone();
        let driver = Arc::new(LocalStreamDriver::new(
            store.clone(),
            handler,
            dead_letters.clone(),
            stream,
        ));

        Self {
            store,
            publisher,
            intake,
            notifier,
            dead_letters,
            driver,
        }
    }

    /// Run the TTL sweep, deliver the change stream, then drop the stream
    /// records the driver has moved past
    pub async fn tick(&self, now: DateTime<Utc>) -> DeliveryReport {
        self.store.expire(now).await;
        self.dead_letters.purge_expired(now).await;
        let report = self.driver.poll_at(now).await;
        self.store.trim_stream(self.driver.checkpoint().await).await;
        report
    }
}
