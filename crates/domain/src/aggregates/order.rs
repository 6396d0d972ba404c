use crate::events::{AttributeValue, Image};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processed,
    /// Declared for the record schema; no transition assigns it.
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Failed => "FAILED",
        }
    }

    /// The only implemented lifecycle edge is `NEW -> PROCESSED`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!((self, next), (OrderStatus::New, OrderStatus::Processed))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "FAILED" => Ok(OrderStatus::Failed),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// A single order as stored in the orders table.
///
/// `expires_at` is epoch seconds; the storage layer deletes the record
/// once that instant has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: String,
    pub snack_type: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub expires_at: i64,
}

impl OrderRecord {
    /// Build a fresh `NEW` record expiring `ttl_days` after `now`
    pub fn new(order_id: String, snack_type: String, now: DateTime<Utc>, ttl_days: u32) -> Self {
        let expires_at = (now + Duration::days(i64::from(ttl_days))).timestamp();

        Self {
            order_id,
            snack_type,
            status: OrderStatus::New,
            created_at: now,
            updated_at: None,
            processed_at: None,
            expires_at,
        }
    }

    /// Apply a lifecycle transition in place
    pub fn transition(&mut self, to: OrderStatus, at: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }

        self.status = to;
        self.updated_at = Some(at);
        if to == OrderStatus::Processed {
            self.processed_at = Some(at);
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }

    /// Render the record as a change-stream image
    pub fn to_image(&self) -> Image {
        let mut image = Image::new();
        image.insert("orderId".to_string(), AttributeValue::S(self.order_id.clone()));
        image.insert("snackType".to_string(), AttributeValue::S(self.snack_type.clone()));
        image.insert("status".to_string(), AttributeValue::S(self.status.to_string()));
        image.insert(
            "createdAt".to_string(),
            AttributeValue::S(self.created_at.to_rfc3339()),
        );
        image.insert(
            "expiresAt".to_string(),
            AttributeValue::N(self.expires_at.to_string()),
        );
        if let Some(updated_at) = self.updated_at {
            image.insert("updatedAt".to_string(), AttributeValue::S(updated_at.to_rfc3339()));
        }
        if let Some(processed_at) = self.processed_at {
            image.insert(
                "processedAt".to_string(),
                AttributeValue::S(processed_at.to_rfc3339()),
            );
        }
        image
    }

    /// Rebuild a record from a change-stream image
    pub fn from_image(image: &Image) -> Result<Self, OrderError> {
        let required = |name: &'static str| {
            image
                .get(name)
                .and_then(AttributeValue::as_s)
                .ok_or(OrderError::MissingAttribute(name))
        };

        let expires_at = image
            .get("expiresAt")
            .and_then(AttributeValue::as_n)
            .ok_or(OrderError::MissingAttribute("expiresAt"))?
            .parse::<i64>()
            .map_err(|e| OrderError::InvalidAttribute {
                name: "expiresAt",
                reason: e.to_string(),
            })?;

        Ok(Self {
            order_id: required("orderId")?.to_string(),
            snack_type: required("snackType")?.to_string(),
            status: required("status")?.parse()?,
            created_at: parse_timestamp("createdAt", required("createdAt")?)?,
            updated_at: optional_timestamp(image, "updatedAt")?,
            processed_at: optional_timestamp(image, "processedAt")?,
            expires_at,
        })
    }
}

pub fn parse_timestamp(name: &'static str, value: &str) -> Result<DateTime<Utc>, OrderError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| OrderError::InvalidAttribute {
            name,
            reason: e.to_string(),
        })
}

fn optional_timestamp(
    image: &Image,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, OrderError> {
    image
        .get(name)
        .and_then(AttributeValue::as_s)
        .map(|value| parse_timestamp(name, value))
        .transpose()
}

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("Unknown order status '{0}'")]
    UnknownStatus(String),

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Missing attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("Invalid attribute '{name}': {reason}")]
    InvalidAttribute { name: &'static str, reason: String },
}
