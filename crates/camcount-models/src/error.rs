//! Model error types.

use std::path::PathBuf;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Camera registry missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry file not found: {0}")]
    RegistryNotFound(PathBuf),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_manifest(msg: impl Into<String>) -> Self {
        Self::InvalidManifest(msg.into())
    }

    /// Whether this error means the registry itself is unusable.
    pub fn is_config_error(&self) -> bool {
        matches!(self, ModelError::Config(_) | ModelError::RegistryNotFound(_))
    }
}
