//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use camcount_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Worker(WorkerError),

    /// Server-side failure whose details were already logged
    #[error("An internal error occurred")]
    Redacted,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// In production, log server-side details and answer with a generic
    /// message instead.
    pub fn redact(self, production: bool) -> Self {
        match self {
            ApiError::Internal(_) | ApiError::Worker(_) if production => {
                tracing::error!("Request failed: {}", self);
                ApiError::Redacted
            }
            other => other,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Worker(_) | ApiError::Redacted => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::UnknownGroup(group) => Self::NotFound(format!("camera group {}", group)),
            other => Self::Worker(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() && !matches!(self, ApiError::Redacted) {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
