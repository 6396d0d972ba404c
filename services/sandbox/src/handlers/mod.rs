pub mod dlq;
pub mod health;
pub mod notifications;
pub mod orders;
