//! Structured request logging.

use tracing::{info, warn, Span};

use camcount_models::RequestId;

/// Logs the lifecycle of one processing request with consistent fields.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: String,
    operation: String,
}

impl RequestLogger {
    pub fn new(request_id: &RequestId, operation: &str) -> Self {
        Self {
            request_id: request_id.as_str().to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request warning: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request completed: {}", message
        );
    }

    /// Span carrying the request fields, for instrumenting whole tasks.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            operation = %self.operation
        )
    }
}
