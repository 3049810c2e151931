//! Length policy for freshly fetched clips.
//!
//! Camera endpoints sometimes return a little more footage than requested.
//! Clips longer than the ceiling lose their tail so every clip stays short.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::video_info::get_duration;

/// When and how much to cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimPolicy {
    /// Clips strictly longer than this are trimmed
    pub ceiling_secs: f64,
    /// Seconds dropped from the end of a trimmed clip
    pub drop_secs: f64,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            ceiling_secs: 8.0,
            drop_secs: 1.0,
        }
    }
}

impl TrimPolicy {
    pub fn new(ceiling_secs: f64, drop_secs: f64) -> Self {
        Self {
            ceiling_secs,
            drop_secs,
        }
    }

    /// Duration to keep for a clip of `duration` seconds, or `None` to leave
    /// it untouched.
    pub fn target_duration(&self, duration: f64) -> Option<f64> {
        if duration > self.ceiling_secs {
            Some((duration - self.drop_secs).max(0.0))
        } else {
            None
        }
    }
}

/// What a trimmer did to a clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrimOutcome {
    Untouched { duration: f64 },
    Trimmed { from: f64, to: f64 },
}

/// Shortens a stored clip in place.
#[async_trait]
pub trait ClipTrimmer: Send + Sync {
    async fn trim(&self, path: &Path) -> MediaResult<TrimOutcome>;
}

/// FFmpeg-backed trimmer; re-encodes with libx264/aac.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTrimmer {
    policy: TrimPolicy,
    runner: FfmpegRunner,
}

impl FfmpegTrimmer {
    pub fn new(policy: TrimPolicy) -> Self {
        Self {
            policy,
            runner: FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl ClipTrimmer for FfmpegTrimmer {
    async fn trim(&self, path: &Path) -> MediaResult<TrimOutcome> {
        let duration = get_duration(path)
            .await
            .map_err(|e| MediaError::trim(format!("ffprobe failed: {}", e)))?;

        let Some(target) = self.policy.target_duration(duration) else {
            debug!(path = %path.display(), duration, "Clip within ceiling, not trimming");
            return Ok(TrimOutcome::Untouched { duration });
        };

        let processed = processed_sibling(path);
        let cmd = FfmpegCommand::new(path, &processed)
            .output_duration(target)
            .video_codec("libx264")
            .audio_codec("aac")
            .video_bitrate("5000k");

        if let Err(e) = self.runner.run(&cmd).await {
            let _ = tokio::fs::remove_file(&processed).await;
            return Err(MediaError::trim(e.to_string()));
        }

        move_file(&processed, path)
            .await
            .map_err(|e| MediaError::trim(format!("replace failed: {}", e)))?;

        info!(path = %path.display(), from = duration, to = target, "Trimmed clip");
        Ok(TrimOutcome::Trimmed {
            from: duration,
            to: target,
        })
    }
}

/// `<dir>/<stem>_processed.mp4`
fn processed_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}_processed.mp4", stem))
}

/// Trimmer that never touches the clip.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrimmer;

#[async_trait]
impl ClipTrimmer for NoopTrimmer {
    async fn trim(&self, _path: &Path) -> MediaResult<TrimOutcome> {
        Ok(TrimOutcome::Untouched { duration: 0.0 })
    }
}
