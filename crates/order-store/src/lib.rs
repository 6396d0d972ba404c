pub mod dynamo_order_store;
pub mod memory_order_store;

pub use dynamo_order_store::DynamoOrderStore;
pub use memory_order_store::InMemoryOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{OrderError, OrderRecord, OrderStatus, PipelineError};
use thiserror::Error;

/// Keyed order table with conditional writes
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new record, refusing to overwrite an existing key
    async fn create(&self, record: &OrderRecord) -> Result<(), StoreError>;

    /// Move an order from `from` to `to` in a single conditional write
    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Load one order by key
    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError>;

    /// Load every order in the table
    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Order already exists: {0}")]
    AlreadyExists(String),

    #[error("Conditional check failed for order: {0}")]
    ConditionFailed(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to decode stored order: {0}")]
    Decode(#[from] OrderError),

    #[error("Rejected status transition: {0}")]
    Lifecycle(OrderError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(order_id) => PipelineError::Conflict { order_id },
            StoreError::Decode(e) | StoreError::Lifecycle(e) => {
                PipelineError::PermanentProcessing(e.to_string())
            }
            other => PipelineError::TransientDependency(other.to_string()),
        }
    }
}
