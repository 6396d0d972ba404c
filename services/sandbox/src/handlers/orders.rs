use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::{OrderRecord, OrderStatus};
use order_store::OrderStore;
use pipeline::api::{handle_intake_event, IntakeResponse, INVALID_JSON_BODY};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::state::AppState;

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct OrderSummary {
    pub total: usize,
    pub new: usize,
    pub processed: usize,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderRecord>,
    pub summary: OrderSummary,
}

pub fn summarize(orders: &[OrderRecord]) -> OrderSummary {
    OrderSummary {
        total: orders.len(),
        new: orders.iter().filter(|o| o.status == OrderStatus::New).count(),
        processed: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Processed)
            .count(),
    }
}

/// Submit an order through the intake handler
pub async fn create_order(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    let response = match serde_json::from_str::<Value>(&body) {
        Ok(payload) => handle_intake_event(&state.pipeline.intake, payload).await,
        Err(_) => Ok(IntakeResponse::bad_request(INVALID_JSON_BODY)),
    };

    match response {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(response.body_json()))
        }
        Err(e) => {
            error!("Intake failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

/// List every order, newest first
pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<OrderListResponse>, (StatusCode, String)> {
    let mut orders = state.pipeline.store.list().await.map_err(|e| {
        error!("Failed to list orders: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to list orders: {}", e))
    })?;
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let summary = summarize(&orders);
    Ok(Json(OrderListResponse { orders, summary }))
}

/// Get a single order by id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderRecord>, (StatusCode, String)> {
    match state.pipeline.store.get(&order_id).await {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => {
            info!("Order not found: {}", order_id);
            Err((StatusCode::NOT_FOUND, format!("Order not found: {}", order_id)))
        }
        Err(e) => {
            error!("Failed to fetch order {}: {}", order_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to fetch order: {}", e),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::config::SandboxConfig;

    fn state() -> AppState {
        AppState::new(&SandboxConfig::from_lookup(|_| None).unwrap())
    }

    #[tokio::test]
    async fn test_create_order_status_codes() {
        let state = state();
        let body = json!({"orderId": "order-1", "snackType": "crisps"}).to_string();

        let (status, Json(value)) = create_order(State(state.clone()), body.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(value["orderId"], "order-1");

        let (status, _) = create_order(State(state.clone()), body).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, Json(value)) = create_order(State(state), "{oops".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], INVALID_JSON_BODY);
    }

    #[tokio::test]
    async fn test_get_unknown_order_is_not_found() {
        let result = get_order(State(state()), Path("missing".to_string())).await;
        assert!(matches!(result, Err((StatusCode::NOT_FOUND, _))));
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let mut processed = OrderRecord::new("order-2".to_string(), "nuts".to_string(), now, 7);
        processed.transition(OrderStatus::Processed, now).unwrap();
        let orders = vec![
            OrderRecord::new("order-1".to_string(), "crisps".to_string(), now, 7),
            processed,
        ];

        assert_eq!(
            summarize(&orders),
            OrderSummary {
                total: 2,
                new: 1,
                processed: 1
            }
        );
    }
}
