//! Startup provisioning.
//!
//! Idempotent: safe to run on every start.

use std::path::PathBuf;

use tracing::info;

use camcount_media::{check_ffmpeg, check_ffprobe, ensure_model, DetectorSettings};
use camcount_models::CameraRegistry;
use camcount_worker::{WorkerConfig, WorkerError, WorkerResult};

/// What startup found.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub model_path: PathBuf,
    pub group_count: usize,
    pub camera_count: usize,
}

/// Create the working directories, make sure the detection model is on
/// disk and validate the camera registry once.
pub async fn prepare(
    config: &WorkerConfig,
    detector: &DetectorSettings,
) -> WorkerResult<Provisioned> {
    for dir in [
        config.download_dir.clone(),
        config.tmp_dir.clone(),
        config.cameras_output_dir(),
        config.manifest_dir(),
    ] {
        tokio::fs::create_dir_all(&dir).await?;
    }

    check_ffmpeg()?;
    check_ffprobe()?;

    let model_path = ensure_model(detector).await?;

    let registry = CameraRegistry::load(&config.cameras_file)?;
    if registry.group_count() == 0 {
        return Err(WorkerError::config(format!(
            "camera registry {} has no groups",
            config.cameras_file.display()
        )));
    }

    info!(
        model = %model_path.display(),
        groups = registry.group_count(),
        cameras = registry.camera_count(),
        "Startup provisioning complete"
    );

    Ok(Provisioned {
        model_path,
        group_count: registry.group_count(),
        camera_count: registry.camera_count(),
    })
}
