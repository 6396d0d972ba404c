use common::config::SandboxConfig;
use pipeline::local::LocalPipeline;
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<LocalPipeline>,
}

impl AppState {
    pub fn new(config: &SandboxConfig) -> Self {
        info!(
            ttl_days = config.ttl_days,
            batch_size = config.stream.batch_size,
            retry_attempts = config.stream.retry_attempts,
            "Creating local pipeline"
        );

        Self {
            pipeline: Arc::new(LocalPipeline::new(config.ttl_days, config.stream.clone())),
        }
    }
}
