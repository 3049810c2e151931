//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown camera group: {0}")]
    UnknownGroup(String),

    #[error("Failed to write manifest {path}: {message}")]
    ManifestWrite { path: PathBuf, message: String },

    #[error("Media error: {0}")]
    Media(#[from] camcount_media::MediaError),

    #[error("Model error: {0}")]
    Model(#[from] camcount_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join failed: {0}")]
    Join(String),
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn manifest_write(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::ManifestWrite {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Errors caused by the camera registry or settings rather than by
    /// processing.
    pub fn is_config_error(&self) -> bool {
        match self {
            WorkerError::Config(_) => true,
            WorkerError::Model(e) => e.is_config_error(),
            _ => false,
        }
    }
}
