pub mod aggregates;
pub mod commands;
pub mod errors;
pub mod events;

pub use aggregates::order::{OrderError, OrderRecord, OrderStatus};
pub use commands::order_commands::CreateOrderRequest;
pub use errors::PipelineError;
pub use events::order_events::{BatchItemFailure, BatchResponse, OrderNotification};
pub use events::{AttributeValue, EventName, Image, StreamChange, StreamEvent, StreamRecord};
