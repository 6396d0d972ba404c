//! Invocation payload adapters shared by the function binaries and the sandbox.

use common::metrics;
use domain::{BatchResponse, EventName, OrderStatus, PipelineError, StreamEvent, StreamRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{error, warn};

use crate::intake::OrderIntake;
use crate::notifier::StreamBatchHandler;

pub const INVALID_JSON_BODY: &str = "Invalid JSON in request body";
pub const ORDER_CREATED: &str = "Order created successfully";
pub const ORDER_EXISTS: &str = "Order already exists";

/// Intake response envelope; `body` is itself a JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl IntakeResponse {
    fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body: body.to_string(),
        }
    }

    pub fn created(order_id: &str) -> Self {
        Self::new(
            201,
            json!({
                "message": ORDER_CREATED,
                "orderId": order_id,
                "status": OrderStatus::New.as_str(),
            }),
        )
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(400, json!({ "error": message }))
    }

    pub fn conflict(order_id: &str) -> Self {
        Self::new(409, json!({ "error": ORDER_EXISTS, "orderId": order_id }))
    }

    /// Parsed `body`; `Value::Null` if it is not valid JSON
    pub fn body_json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// Unwrap an API-gateway style envelope whose `body` is a JSON string.
///
/// Any other payload is taken as the request object itself.
pub fn request_payload(event: Value) -> Result<Value, PipelineError> {
    match event.get("body") {
        Some(Value::String(body)) => serde_json::from_str(body)
            .map_err(|_| PipelineError::Validation(INVALID_JSON_BODY.to_string())),
        _ => Ok(event),
    }
}

/// Run one intake invocation and map the result onto the response envelope.
///
/// Transient dependency failures are returned as `Err` so the invoker sees
/// a function error.
pub async fn handle_intake_event(
    intake: &OrderIntake,
    event: Value,
) -> Result<IntakeResponse, PipelineError> {
    let payload = match request_payload(event) {
        Ok(payload) => payload,
        Err(PipelineError::Validation(message)) => {
            warn!("Rejected request body: {}", message);
            return Ok(IntakeResponse::bad_request(&message));
        }
        Err(e) => return Err(e),
    };

    match intake.handle(&payload).await {
        Ok(record) => Ok(IntakeResponse::created(&record.order_id)),
        Err(PipelineError::Validation(message)) => Ok(IntakeResponse::bad_request(&message)),
        Err(PipelineError::Conflict { order_id }) => Ok(IntakeResponse::conflict(&order_id)),
        Err(e) => Err(e),
    }
}

/// Decode a change-stream invocation record by record and hand the readable
/// records to the batch handler.
///
/// A record that does not decode is reported as a failure under its own
/// sequence number, so the rest of the batch still goes through. Without a
/// sequence number it cannot be reported and is only logged. Failures are
/// returned in delivery order.
pub async fn handle_stream_event<H>(handler: &H, mut event: Value) -> Result<BatchResponse, PipelineError>
where
    H: StreamBatchHandler + ?Sized,
{
    if !event.is_object() {
        error!("Stream event is not a JSON object");
        return Err(PipelineError::PermanentProcessing(
            "invalid stream event: expected an object".to_string(),
        ));
    }

    let entries: Vec<Value> = match event.get_mut("Records").map(Value::take) {
        None | Some(Value::Null) => Vec::new(),
        Some(records) => serde_json::from_value(records).map_err(|e| {
            error!("Undecodable stream event: {}", e);
            PipelineError::PermanentProcessing(format!("invalid stream event: {}", e))
        })?,
    };

    let mut decoded = StreamEvent::default();
    let mut delivery_order = Vec::with_capacity(entries.len());
    let mut undecodable = HashSet::new();

    for entry in entries {
        let sequence_number = entry
            .pointer("/dynamodb/SequenceNumber")
            .and_then(Value::as_str)
            .map(str::to_string);

        match serde_json::from_value::<StreamRecord>(entry) {
            Ok(record) => decoded.records.push(record),
            Err(e) => {
                metrics::record_stream_record(EventName::Unknown.as_str(), "failed");
                match &sequence_number {
                    Some(sequence_number) => {
                        error!(
                            sequence_number = %sequence_number,
                            error_kind = "permanent_processing",
                            "Undecodable stream record: {}",
                            e
                        );
                        undecodable.insert(sequence_number.clone());
                    }
                    None => error!("Undecodable stream record without sequence number: {}", e),
                }
            }
        }

        if let Some(sequence_number) = sequence_number {
            delivery_order.push(sequence_number);
        }
    }

    let handled = handler.handle_batch(&decoded).await;
    if undecodable.is_empty() {
        return Ok(handled);
    }

    let mut failed: HashSet<String> = handled
        .batch_item_failures
        .into_iter()
        .map(|f| f.item_identifier)
        .collect();
    failed.extend(undecodable);

    let mut response = BatchResponse::default();
    for sequence_number in delivery_order {
        if failed.remove(&sequence_number) {
            response.push_failure(sequence_number);
        }
    }
    // anything left was reported by the handler for a record it never got
    for sequence_number in failed {
        response.push_failure(sequence_number);
    }

    Ok(response)
}
