//! Download-then-process pipeline shared by the HTTP handler and the
//! auto-refresh loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use camcount_media::{
    ClipFetcher, DetectionEngine, FfmpegRunner, FfmpegTranscoder, FfmpegTrimmer, FrameBackend,
    ObjectDetect,
};
use camcount_models::{CameraRegistry, GroupSnapshot, RequestId};

use crate::config::WorkerConfig;
use crate::download::DownloadOrchestrator;
use crate::error::{WorkerError, WorkerResult};
use crate::processing::{ProcessingOrchestrator, ProcessingReport};

/// Both orchestrators plus the locations they share.
#[derive(Clone)]
pub struct Pipeline {
    cameras_file: PathBuf,
    output_root: PathBuf,
    download: DownloadOrchestrator,
    processing: ProcessingOrchestrator,
}

impl Pipeline {
    pub fn new(
        cameras_file: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        download: DownloadOrchestrator,
        processing: ProcessingOrchestrator,
    ) -> Self {
        Self {
            cameras_file: cameras_file.into(),
            output_root: output_root.into(),
            download,
            processing,
        }
    }

    /// Wire the FFmpeg trimmer and transcoder around the given detector.
    pub fn from_config(
        config: &WorkerConfig,
        detector: Arc<dyn ObjectDetect>,
        backend: Arc<dyn FrameBackend>,
    ) -> WorkerResult<Self> {
        let trimmer = Arc::new(FfmpegTrimmer::new(config.trim_policy));
        let fetcher = ClipFetcher::new(config.fetch_timeout, trimmer)?;
        let download = DownloadOrchestrator::new(fetcher, &config.download_dir);

        let engine = DetectionEngine::new(backend, detector)
            .with_vehicle_classes(config.vehicle_classes.clone());
        if !engine.annotates() {
            warn!("Built without the opencv feature; clips are served without boxes or labels");
        }
        let runner = match config.clip_timeout {
            Some(limit) => FfmpegRunner::new().with_timeout(limit),
            None => FfmpegRunner::new(),
        };
        let transcoder = Arc::new(FfmpegTranscoder::new(runner));
        let processing = ProcessingOrchestrator::new(engine, transcoder, &config.tmp_dir)
            .with_clip_timeout(config.clip_timeout)
            .with_max_parallel(config.max_detection_parallel);

        Ok(Self::new(
            &config.cameras_file,
            &config.output_root,
            download,
            processing,
        ))
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Read the registry from disk. Called on every run so edits are picked
    /// up without a restart.
    pub async fn load_registry(&self) -> WorkerResult<CameraRegistry> {
        let path = self.cameras_file.clone();
        let registry = tokio::task::spawn_blocking(move || CameraRegistry::load(path))
            .await
            .map_err(|e| WorkerError::Join(e.to_string()))??;
        Ok(registry)
    }

    /// Fetch and process one group; the group id doubles as request id.
    pub async fn run_group(&self, group_id: &str) -> WorkerResult<ProcessingReport> {
        let registry = self.load_registry().await?;
        let selected = registry
            .select(group_id)
            .ok_or_else(|| WorkerError::UnknownGroup(group_id.to_string()))?;
        let request_id = RequestId::parse(group_id)?;

        let snapshot = self.download.run(&selected).await?;
        self.processing
            .run(&snapshot, &self.output_root, &request_id)
            .await
    }

    /// One download over the whole registry, then processing of each group
    /// in `groups` (every group when `None`) from that snapshot.
    ///
    /// Groups are processed one after another; a failing group is logged
    /// and does not stop the rest.
    pub async fn refresh(&self, groups: Option<&[String]>) -> WorkerResult<Vec<ProcessingReport>> {
        let registry = self.load_registry().await?;
        let snapshot = self.download.run(&registry).await?;

        let targets: Vec<String> = match groups {
            Some(groups) => groups.to_vec(),
            None => registry.group_ids().map(str::to_string).collect(),
        };

        let mut reports = Vec::with_capacity(targets.len());
        for group_id in targets {
            match self.process_group(&snapshot, &group_id).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(group_id = %group_id, "Refresh skipped group: {}", e),
            }
        }

        info!(processed_groups = reports.len(), "Refresh finished");
        Ok(reports)
    }

    async fn process_group(
        &self,
        snapshot: &GroupSnapshot,
        group_id: &str,
    ) -> WorkerResult<ProcessingReport> {
        let selected = snapshot
            .select(group_id)
            .ok_or_else(|| WorkerError::UnknownGroup(group_id.to_string()))?;
        let request_id = RequestId::parse(group_id)?;
        self.processing
            .run(&selected, &self.output_root, &request_id)
            .await
    }
}
