//! Per-clip detection outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::clip::ClipRecord;

/// A clip that went through detection and transcoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub source: ClipRecord,
    /// Absolute path of the web-playable output
    pub processed_path: PathBuf,
    /// One entry per one-second bucket, `duration + 1` entries
    pub vehicle_counts: Vec<u32>,
}

impl DetectionResult {
    pub fn new(source: ClipRecord, processed_path: PathBuf, vehicle_counts: Vec<u32>) -> Self {
        Self {
            source,
            processed_path,
            vehicle_counts,
        }
    }

    pub fn peak_count(&self) -> u32 {
        self.vehicle_counts.iter().copied().max().unwrap_or(0)
    }
}

/// Why a clip did not reach the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipFailureKind {
    /// Fetch already failed upstream; nothing to process
    Skipped,
    /// Source could not be opened or decoded
    MediaOpen,
    /// Failure while streaming frames through the detector
    Detection,
    /// Working file could not be converted to the served format
    Transcode,
    /// Clip exceeded the configured per-clip deadline
    TimedOut,
    /// The clip task panicked
    Panicked,
    /// The clip task was dropped before it finished
    Cancelled,
}

impl ClipFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipFailureKind::Skipped => "skipped",
            ClipFailureKind::MediaOpen => "media_open",
            ClipFailureKind::Detection => "detection",
            ClipFailureKind::Transcode => "transcode",
            ClipFailureKind::TimedOut => "timed_out",
            ClipFailureKind::Panicked => "panicked",
            ClipFailureKind::Cancelled => "cancelled",
        }
    }

    /// Upstream skips are expected and not worth an error log line.
    pub fn is_silent(&self) -> bool {
        matches!(self, ClipFailureKind::Skipped)
    }
}

impl fmt::Display for ClipFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure for one clip task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFailure {
    pub group_id: String,
    pub camera_id: String,
    pub kind: ClipFailureKind,
    pub message: String,
}

impl ClipFailure {
    pub fn new(clip: &ClipRecord, kind: ClipFailureKind, message: impl Into<String>) -> Self {
        Self {
            group_id: clip.group_id().to_string(),
            camera_id: clip.camera_id().to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn skipped(clip: &ClipRecord) -> Self {
        let reason = clip.fetch_error.clone().unwrap_or_else(|| "no local clip".to_string());
        Self::new(clip, ClipFailureKind::Skipped, reason)
    }
}

impl fmt::Display for ClipFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}: {}",
            self.group_id, self.camera_id, self.kind, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraDescriptor;

    #[test]
    fn test_skipped_uses_fetch_error() {
        let camera = CameraDescriptor::new("2", "c", "Bridge", "http://x/c");
        let clip = ClipRecord::failed(camera, 1, "HTTP 404 Not Found");
        let failure = ClipFailure::skipped(&clip);

        assert_eq!(failure.kind, ClipFailureKind::Skipped);
        assert!(failure.kind.is_silent());
        assert_eq!(failure.message, "HTTP 404 Not Found");
        assert_eq!(failure.to_string(), "2/c skipped: HTTP 404 Not Found");
    }

    #[test]
    fn test_peak_count() {
        let camera = CameraDescriptor::new("1", "a", "A", "http://x/a");
        let clip = ClipRecord::fetched(camera, 1, PathBuf::from("/in.mp4"));
        let result = DetectionResult::new(clip, PathBuf::from("/out.mp4"), vec![0, 3, 1]);
        assert_eq!(result.peak_count(), 3);
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ClipFailureKind::MediaOpen).unwrap();
        assert_eq!(json, "\"media_open\"");
        assert!(!ClipFailureKind::Transcode.is_silent());
        assert_eq!(ClipFailureKind::Cancelled.to_string(), "cancelled");
    }
}
