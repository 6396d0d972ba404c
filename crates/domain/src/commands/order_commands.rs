use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

pub const INVALID_ORDER_ID: &str = "Missing or invalid orderId (must be a non-empty string)";
pub const INVALID_SNACK_TYPE: &str = "Missing or invalid snackType (must be a non-empty string)";

/// Request to create a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Missing or invalid orderId (must be a non-empty string)"))]
    pub order_id: String,

    #[validate(length(min = 1, message = "Missing or invalid snackType (must be a non-empty string)"))]
    pub snack_type: String,
}

impl CreateOrderRequest {
    pub fn new(order_id: impl Into<String>, snack_type: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            snack_type: snack_type.into(),
        }
    }

    /// Extract and validate a request from an untyped JSON payload.
    ///
    /// Non-string values are treated the same as missing ones. `orderId`
    /// is checked before `snackType`.
    pub fn parse(payload: &Value) -> Result<Self, PipelineError> {
        let order_id = string_field(payload, "orderId")
            .ok_or_else(|| PipelineError::Validation(INVALID_ORDER_ID.to_string()))?;
        let snack_type = string_field(payload, "snackType")
            .ok_or_else(|| PipelineError::Validation(INVALID_SNACK_TYPE.to_string()))?;

        let request = Self::new(order_id, snack_type);
        request.check()?;
        Ok(request)
    }

    /// Run field validation, reporting the first offending field
    pub fn check(&self) -> Result<(), PipelineError> {
        self.validate().map_err(|errors| {
            let message = if errors.errors().contains_key("order_id") {
                INVALID_ORDER_ID
            } else {
                INVALID_SNACK_TYPE
            };
            PipelineError::Validation(message.to_string())
        })
    }
}

fn string_field<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}
