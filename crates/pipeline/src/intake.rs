use chrono::Utc;
use common::metrics;
use domain::{CreateOrderRequest, OrderRecord, PipelineError};
use order_store::OrderStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Order intake handler: validates a creation request and writes a `NEW` record
pub struct OrderIntake {
    store: Arc<dyn OrderStore>,
    ttl_days: u32,
}

impl OrderIntake {
    pub fn new(store: Arc<dyn OrderStore>, ttl_days: u32) -> Self {
        Self { store, ttl_days }
    }

    pub fn ttl_days(&self) -> u32 {
        self.ttl_days
    }

    /// Parse, validate and persist an untyped request payload
    pub async fn handle(&self, payload: &Value) -> Result<OrderRecord, PipelineError> {
        let started = Instant::now();

        let result = match CreateOrderRequest::parse(payload) {
            Ok(request) => self.create_order(request).await,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.kind(),
        };
        metrics::record_intake(outcome, started.elapsed().as_secs_f64());

        result
    }

    /// Persist a new order with status `NEW`.
    ///
    /// A second request for the same `orderId` is rejected with
    /// `PipelineError::Conflict` and leaves the stored record untouched.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderRecord, PipelineError> {
        if let Err(e) = request.check() {
            warn!("Rejected order request: {}", e);
            return Err(e);
        }

        let record = OrderRecord::new(request.order_id, request.snack_type, Utc::now(), self.ttl_days);

        match self.store.create(&record).await {
            Ok(()) => {
                info!(
                    order_id = %record.order_id,
                    expires_at = record.expires_at,
                    "Order created"
                );
                Ok(record)
            }
            Err(e) => {
                let err = PipelineError::from(e);
                if err.is_client_error() {
                    warn!(order_id = %record.order_id, "Order already exists");
                } else {
                    error!(order_id = %record.order_id, "Failed to create order: {}", err);
                }
                Err(err)
            }
        }
    }
}
