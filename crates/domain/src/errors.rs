use thiserror::Error;

/// Error kinds surfaced by the order handlers.
///
/// `Validation` and `Conflict` are answered synchronously to the caller.
/// The remaining kinds propagate to the invoking platform, which owns
/// retry counting and dead-lettering.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Order already exists: {order_id}")]
    Conflict { order_id: String },

    #[error("Dependency failure: {0}")]
    TransientDependency(String),

    #[error("Permanent processing failure: {0}")]
    PermanentProcessing(String),
}

impl PipelineError {
    /// Stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Conflict { .. } => "conflict",
            PipelineError::TransientDependency(_) => "transient_dependency",
            PipelineError::PermanentProcessing(_) => "permanent_processing",
        }
    }

    /// Whether the error is answered to the caller rather than raised to the platform
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::Conflict { .. }
        )
    }
}
