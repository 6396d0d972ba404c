pub mod api;
pub mod intake;
pub mod local;
pub mod notifier;

pub use intake::OrderIntake;
pub use notifier::{ChangeNotifier, RecordOutcome, SkipReason, StreamBatchHandler};

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use domain::{OrderNotification, OrderRecord, OrderStatus};
    use messaging::{NotificationPublisher, PublisherError};
    use mockall::mock;
    use order_store::{OrderStore, StoreError};

    mock! {
        pub Store {}

        #[async_trait]
        impl OrderStore for Store {
            async fn create(&self, record: &OrderRecord) -> Result<(), StoreError>;
            async fn transition(
                &self,
                order_id: &str,
                from: OrderStatus,
                to: OrderStatus,
                at: DateTime<Utc>,
            ) -> Result<(), StoreError>;
            async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError>;
            async fn list(&self) -> Result<Vec<OrderRecord>, StoreError>;
        }
    }

    mock! {
        pub Publisher {}

        #[async_trait]
        impl NotificationPublisher for Publisher {
            async fn publish(&self, notification: &OrderNotification) -> Result<String, PublisherError>;
        }
    }
}
