//! Application state.

use std::sync::Arc;
use std::time::Instant;

use camcount_worker::Pipeline;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            started_at: Instant::now(),
        }
    }
}
