//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while fetching, detecting or encoding clips.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Trim failed: {0}")]
    Trim(String),

    #[error("Cannot open media {path}: {message}")]
    MediaOpen { path: PathBuf, message: String },

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    pub fn trim(message: impl Into<String>) -> Self {
        Self::Trim(message.into())
    }

    pub fn media_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MediaOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    pub fn transcode(message: impl Into<String>) -> Self {
        Self::Transcode(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the clip could not be opened at all, as opposed to failing
    /// part-way through.
    pub fn is_media_open(&self) -> bool {
        matches!(self, MediaError::MediaOpen { .. } | MediaError::FileNotFound(_))
    }
}
