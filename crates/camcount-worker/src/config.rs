//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use camcount_media::{TrimPolicy, DEFAULT_VEHICLE_CLASSES};

/// Worker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Camera registry JSON file
    pub cameras_file: PathBuf,
    /// Where fetched clips are stored
    pub download_dir: PathBuf,
    /// Working files written during detection
    pub tmp_dir: PathBuf,
    /// Root of processed clips and manifests
    pub output_root: PathBuf,
    /// HTTP timeout for one clip fetch
    pub fetch_timeout: Duration,
    pub trim_policy: TrimPolicy,
    /// Deadline for detecting and transcoding one clip
    pub clip_timeout: Option<Duration>,
    /// Maximum clips processed at once; unbounded when unset
    pub max_detection_parallel: Option<usize>,
    /// COCO class ids counted as vehicles
    pub vehicle_classes: Vec<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cameras_file: PathBuf::from("./cameras.json"),
            download_dir: PathBuf::from("downloaded_videos"),
            tmp_dir: PathBuf::from("tmp"),
            output_root: PathBuf::from("processed_videos"),
            fetch_timeout: Duration::from_secs(60),
            trim_policy: TrimPolicy::default(),
            clip_timeout: None,
            max_detection_parallel: None,
            vehicle_classes: DEFAULT_VEHICLE_CLASSES.to_vec(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cameras_file: env_path("CAMERAS_FILE").unwrap_or(defaults.cameras_file),
            download_dir: env_path("DOWNLOAD_DIR").unwrap_or(defaults.download_dir),
            tmp_dir: env_path("TMP_DIR").unwrap_or(defaults.tmp_dir),
            output_root: env_path("OUTPUT_ROOT").unwrap_or(defaults.output_root),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            trim_policy: TrimPolicy::new(
                std::env::var("TRIM_CEILING_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.trim_policy.ceiling_secs),
                std::env::var("TRIM_DROP_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.trim_policy.drop_secs),
            ),
            clip_timeout: std::env::var("CLIP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs),
            max_detection_parallel: std::env::var("MAX_DETECTION_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0),
            vehicle_classes: std::env::var("VEHICLE_CLASSES")
                .ok()
                .and_then(|s| parse_class_list(&s))
                .unwrap_or(defaults.vehicle_classes),
        }
    }

    /// `{output_root}/cameras`
    pub fn cameras_output_dir(&self) -> PathBuf {
        self.output_root.join("cameras")
    }

    /// `{output_root}/info`
    pub fn manifest_dir(&self) -> PathBuf {
        self.output_root.join("info")
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Parse `"2,5,7"`; `None` when empty or malformed.
fn parse_class_list(raw: &str) -> Option<Vec<usize>> {
    let classes: Option<Vec<usize>> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect();
    classes.filter(|c| !c.is_empty())
}
