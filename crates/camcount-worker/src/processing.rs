//! Processing orchestrator: one detect-and-transcode task per clip.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, Instrument};

use camcount_media::fs_utils::{remove_if_exists, write_atomic};
use camcount_media::{DetectionEngine, Transcode};
use camcount_models::{
    ClipFailure, ClipFailureKind, ClipRecord, DetectionResult, GroupSnapshot, RequestId,
    RequestManifest,
};

use crate::error::{WorkerError, WorkerResult};
use crate::fan_out::{join_ordered, TaskFailure};
use crate::logging::RequestLogger;
use crate::metrics;

/// Outcome of one processing request.
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub manifest: RequestManifest,
    /// Where the manifest was written
    pub manifest_path: PathBuf,
    /// Clips that did not make it into the manifest, in submission order
    pub failures: Vec<ClipFailure>,
}

impl ProcessingReport {
    pub fn processed_count(&self) -> usize {
        self.manifest.len()
    }

    /// Failures other than upstream skips.
    pub fn failed_count(&self) -> usize {
        self.failures.iter().filter(|f| !f.kind.is_silent()).count()
    }
}

/// Runs detection and transcoding over every fetched clip of a snapshot.
#[derive(Clone)]
pub struct ProcessingOrchestrator {
    engine: DetectionEngine,
    transcoder: Arc<dyn Transcode>,
    tmp_dir: PathBuf,
    clip_timeout: Option<Duration>,
    max_parallel: Option<usize>,
}

impl ProcessingOrchestrator {
    pub fn new(
        engine: DetectionEngine,
        transcoder: Arc<dyn Transcode>,
        tmp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            transcoder,
            tmp_dir: tmp_dir.into(),
            clip_timeout: None,
            max_parallel: None,
        }
    }

    pub fn with_clip_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.clip_timeout = timeout;
        self
    }

    pub fn with_max_parallel(mut self, limit: Option<usize>) -> Self {
        self.max_parallel = limit;
        self
    }

    /// Process every clip of `snapshot` and persist the manifest under
    /// `{output_root}/info/{request_id}.json`.
    ///
    /// Per-clip failures end up in the report; only a manifest that cannot
    /// be written fails the request.
    pub async fn run(
        &self,
        snapshot: &GroupSnapshot,
        output_root: &Path,
        request_id: &RequestId,
    ) -> WorkerResult<ProcessingReport> {
        let logger = RequestLogger::new(request_id, "processing");
        let started = Instant::now();
        logger.log_start(&format!(
            "{} clips, {} fetched",
            snapshot.clip_count(),
            snapshot.fetched_count()
        ));

        let out_dir = output_root.join("cameras").join(request_id.as_str());
        tokio::fs::create_dir_all(&out_dir).await?;
        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        let out_dir = tokio::fs::canonicalize(&out_dir).await?;

        let clips: Vec<ClipRecord> = snapshot.clips().cloned().collect();
        let mut outcomes: Vec<Option<Result<DetectionResult, ClipFailure>>> =
            Vec::with_capacity(clips.len());
        let mut submitted = Vec::new();
        let mut tasks = Vec::new();

        for (index, clip) in clips.iter().enumerate() {
            if !clip.is_fetched() {
                outcomes.push(Some(Err(ClipFailure::skipped(clip))));
                continue;
            }
            outcomes.push(None);
            submitted.push(index);
            tasks.push(
                self.clone()
                    .process_clip(clip.clone(), out_dir.clone())
                    .instrument(logger.create_span()),
            );
        }

        let joined = join_ordered(tasks, self.max_parallel).await;
        for (index, outcome) in submitted.into_iter().zip(joined) {
            let clip = &clips[index];
            outcomes[index] = Some(outcome.unwrap_or_else(|failure| {
                Err(ClipFailure::new(clip, failure_kind(&failure), failure.to_string()))
            }));
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(result) => {
                    debug!(
                        group_id = %result.source.group_id(),
                        camera_id = %result.source.camera_id(),
                        peak_vehicles = result.peak_count(),
                        "Clip processed"
                    );
                    metrics::record_clip_processed(result.source.group_id());
                    results.push(result);
                }
                Err(failure) => {
                    if failure.kind.is_silent() {
                        debug!(
                            group_id = %failure.group_id,
                            camera_id = %failure.camera_id,
                            "Skipping clip without local file"
                        );
                    } else {
                        error!(
                            request_id = %request_id,
                            group_id = %failure.group_id,
                            camera_id = %failure.camera_id,
                            kind = %failure.kind,
                            "Clip processing failed: {}",
                            failure.message
                        );
                        metrics::record_clip_failed(&failure.group_id, failure.kind.as_str());
                    }
                    failures.push(failure);
                }
            }
        }

        let manifest = RequestManifest::new(request_id.clone(), &results);
        let manifest_path = write_manifest(output_root, &manifest).await?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_processing_duration(request_id.as_str(), elapsed);
        let report = ProcessingReport {
            manifest,
            manifest_path,
            failures,
        };
        if report.failed_count() > 0 {
            logger.log_warning(&format!("{} clips left out of the manifest", report.failed_count()));
        }
        logger.log_completion(&format!(
            "{} processed, {} failed in {:.1}s",
            report.processed_count(),
            report.failed_count(),
            elapsed
        ));

        Ok(report)
    }

    async fn process_clip(
        self,
        clip: ClipRecord,
        out_dir: PathBuf,
    ) -> Result<DetectionResult, ClipFailure> {
        let Some(local) = clip.local_path.clone() else {
            return Err(ClipFailure::skipped(&clip));
        };
        let Some(file_name) = local.file_name().map(|n| n.to_os_string()) else {
            return Err(ClipFailure::new(
                &clip,
                ClipFailureKind::MediaOpen,
                format!("clip path {} has no file name", local.display()),
            ));
        };
        let working = self.tmp_dir.join(&file_name);
        let processed = out_dir.join(&file_name);

        let work = self.detect_and_transcode(&clip, &local, &working, &processed);
        let outcome = match self.clip_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ClipFailure::new(
                    &clip,
                    ClipFailureKind::TimedOut,
                    format!("exceeded {}s", limit.as_secs_f64()),
                )),
            },
            None => work.await,
        };

        // A timed-out detection removes its own late writes once it stops
        let mut leftovers = vec![&working];
        if outcome.is_err() {
            leftovers.push(&processed);
        }
        for path in leftovers {
            if let Err(e) = remove_if_exists(path).await {
                debug!(path = %path.display(), "Failed to remove leftover file: {}", e);
            }
        }

        outcome.map(|counts| DetectionResult::new(clip, processed, counts))
    }

    async fn detect_and_transcode(
        &self,
        clip: &ClipRecord,
        local: &Path,
        working: &Path,
        processed: &Path,
    ) -> Result<Vec<u32>, ClipFailure> {
        let (working, counts) = self.engine.detect(local, working).await.map_err(|e| {
            let kind = if e.is_media_open() {
                ClipFailureKind::MediaOpen
            } else {
                ClipFailureKind::Detection
            };
            ClipFailure::new(clip, kind, e.to_string())
        })?;

        self.transcoder
            .transcode(&working, processed)
            .await
            .map_err(|e| ClipFailure::new(clip, ClipFailureKind::Transcode, e.to_string()))?;

        Ok(counts)
    }
}

fn failure_kind(failure: &TaskFailure) -> ClipFailureKind {
    match failure {
        TaskFailure::Panicked(_) => ClipFailureKind::Panicked,
        TaskFailure::Cancelled => ClipFailureKind::Cancelled,
    }
}

/// Persist `manifest` as `{output_root}/info/{request_id}.json`.
pub async fn write_manifest(
    output_root: &Path,
    manifest: &RequestManifest,
) -> WorkerResult<PathBuf> {
    let path = output_root
        .join("info")
        .join(manifest.request_id.manifest_file_name());

    let json = manifest
        .to_json_pretty()
        .map_err(|e| WorkerError::manifest_write(&path, e.to_string()))?;
    write_atomic(&path, json)
        .await
        .map_err(|e| WorkerError::manifest_write(&path, e.to_string()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CopyTranscoder, FakeClip, FakeDetector, FakeFrameBackend};
    use camcount_models::CameraDescriptor;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("downloads")).unwrap();
            Self { dir }
        }

        fn output_root(&self) -> PathBuf {
            self.dir.path().join("processed_videos")
        }

        fn tmp_dir(&self) -> PathBuf {
            self.dir.path().join("tmp")
        }

        fn clip(&self, group: &str, camera: &str, content: Option<&str>) -> ClipRecord {
            let descriptor = CameraDescriptor::new(
                group,
                camera,
                format!("Camera {}", camera),
                format!("http://cams.local/{}", camera),
            );
            match content {
                Some(content) => {
                    let path = self
                        .dir
                        .path()
                        .join("downloads")
                        .join(descriptor.clip_file_name(7));
                    std::fs::write(&path, content).unwrap();
                    ClipRecord::fetched(descriptor, 7, path)
                }
                None => ClipRecord::failed(descriptor, 7, "HTTP 404 Not Found"),
            }
        }

        fn orchestrator(&self, fail_on: Option<&'static str>) -> ProcessingOrchestrator {
            let engine =
                DetectionEngine::new(Arc::new(FakeFrameBackend), Arc::new(FakeDetector));
            ProcessingOrchestrator::new(
                engine,
                Arc::new(CopyTranscoder { fail_on }),
                self.tmp_dir(),
            )
        }
    }

    fn snapshot(groups: Vec<(&str, Vec<ClipRecord>)>) -> GroupSnapshot {
        GroupSnapshot::from_groups(
            groups
                .into_iter()
                .map(|(g, clips)| (g.to_string(), clips))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[tokio::test]
    async fn test_manifest_lists_successful_clips_only() {
        let fx = Fixture::new();
        let clip_ok = FakeClip::new(330, 30).encode();
        let snapshot = snapshot(vec![
            (
                "1",
                vec![
                    fx.clip("1", "a", Some(&clip_ok)),
                    fx.clip("1", "b", None),
                    fx.clip("1", "c", Some("corrupt")),
                    fx.clip("1", "d", Some(&clip_ok)),
                ],
            ),
            ("2", vec![fx.clip("2", "e", Some(&clip_ok))]),
        ]);
        let request_id = RequestId::parse("1").unwrap();

        let report = fx
            .orchestrator(Some("_d_"))
            .run(&snapshot, &fx.output_root(), &request_id)
            .await
            .unwrap();

        // a and e succeed; b skipped; c unopenable; d fails to transcode
        let cameras: Vec<_> = report.manifest.entries.iter().map(|e| e.camera.as_str()).collect();
        assert_eq!(cameras, vec!["a", "e"]);

        let kinds: Vec<_> = report
            .failures
            .iter()
            .map(|f| (f.camera_id.as_str(), f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("b", ClipFailureKind::Skipped),
                ("c", ClipFailureKind::MediaOpen),
                ("d", ClipFailureKind::Transcode),
            ]
        );
        assert_eq!(report.failed_count(), 2);

        let entry = &report.manifest.entries[0];
        assert_eq!(entry.number_vehicles.len(), 12);
        assert_eq!(entry.number_vehicles[..4], [0, 1, 0, 1]);
        assert!(entry.processed_video_path.is_absolute());
        assert!(entry
            .processed_video_path
            .ends_with("processed_videos/cameras/1/1_a_7.mp4"));
        assert!(entry.processed_video_path.exists());

        // Working files are cleaned up
        assert_eq!(std::fs::read_dir(fx.tmp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_manifest_file_matches_report() {
        let fx = Fixture::new();
        let snapshot = snapshot(vec![(
            "3",
            vec![fx.clip("3", "a", Some(&FakeClip::new(60, 30).encode()))],
        )]);
        let request_id = RequestId::parse("3").unwrap();

        let report = fx
            .orchestrator(None)
            .run(&snapshot, &fx.output_root(), &request_id)
            .await
            .unwrap();

        assert_eq!(
            report.manifest_path,
            fx.output_root().join("info").join("3.json")
        );
        let raw = std::fs::read(&report.manifest_path).unwrap();
        let persisted = RequestManifest::from_json_slice(&raw).unwrap();
        assert_eq!(persisted, report.manifest);
        assert_eq!(persisted.entries[0].number_vehicles, vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_manifest() {
        let fx = Fixture::new();
        let request_id = RequestId::parse("1").unwrap();
        let orchestrator = fx.orchestrator(None);

        let first = snapshot(vec![(
            "1",
            vec![
                fx.clip("1", "a", Some(&FakeClip::new(30, 30).encode())),
                fx.clip("1", "b", Some(&FakeClip::new(30, 30).encode())),
            ],
        )]);
        orchestrator
            .run(&first, &fx.output_root(), &request_id)
            .await
            .unwrap();

        let second = snapshot(vec![("1", vec![fx.clip("1", "a", None)])]);
        let report = orchestrator
            .run(&second, &fx.output_root(), &request_id)
            .await
            .unwrap();

        let raw = std::fs::read(&report.manifest_path).unwrap();
        let persisted = RequestManifest::from_json_slice(&raw).unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_clip_is_isolated() {
        let fx = Fixture::new();
        let crashing = FakeClip {
            panic_at: Some(5),
            ..FakeClip::new(30, 30)
        };
        let snapshot = snapshot(vec![(
            "1",
            vec![
                fx.clip("1", "a", Some(&crashing.encode())),
                fx.clip("1", "b", Some(&FakeClip::new(30, 30).encode())),
            ],
        )]);

        let report = fx
            .orchestrator(None)
            .run(&snapshot, &fx.output_root(), &RequestId::parse("1").unwrap())
            .await
            .unwrap();

        assert_eq!(report.manifest.len(), 1);
        assert_eq!(report.manifest.entries[0].camera, "b");
        assert_eq!(report.failures[0].kind, ClipFailureKind::Panicked);
        assert!(report.failures[0].message.contains("decoder crashed"));
    }

    #[tokio::test]
    async fn test_clip_timeout() {
        let fx = Fixture::new();
        let stalled = FakeClip {
            stall: true,
            ..FakeClip::new(3, 30)
        };
        let snapshot = snapshot(vec![(
            "1",
            vec![
                fx.clip("1", "slow", Some(&stalled.encode())),
                fx.clip("1", "fast", Some(&FakeClip::new(30, 30).encode())),
            ],
        )]);

        let report = fx
            .orchestrator(None)
            .with_clip_timeout(Some(Duration::from_millis(100)))
            .with_max_parallel(Some(2))
            .run(&snapshot, &fx.output_root(), &RequestId::parse("1").unwrap())
            .await
            .unwrap();

        assert_eq!(report.manifest.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].camera_id, "slow");
        assert_eq!(report.failures[0].kind, ClipFailureKind::TimedOut);

        // The stalled decode would finish after ~1.2s; it must stop early
        // and leave nothing behind
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(std::fs::read_dir(fx.tmp_dir()).unwrap().count(), 0);
        assert!(!fx.output_root().join("cameras/1/1_slow_7.mp4").exists());
    }

    #[test]
    fn test_task_failure_kinds() {
        assert_eq!(
            failure_kind(&TaskFailure::Panicked("boom".to_string())),
            ClipFailureKind::Panicked
        );
        assert_eq!(failure_kind(&TaskFailure::Cancelled), ClipFailureKind::Cancelled);
    }

    #[tokio::test]
    async fn test_unwritable_manifest_fails_request() {
        let fx = Fixture::new();
        let output_root = fx.output_root();
        std::fs::create_dir_all(&output_root).unwrap();
        // A file where the info directory should be
        std::fs::write(output_root.join("info"), b"not a dir").unwrap();

        let snapshot = snapshot(vec![("1", vec![fx.clip("1", "a", None)])]);
        let err = fx
            .orchestrator(None)
            .run(&snapshot, &output_root, &RequestId::parse("1").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::ManifestWrite { .. }));
    }

    #[tokio::test]
    async fn test_empty_snapshot_writes_empty_manifest() {
        let fx = Fixture::new();
        let report = fx
            .orchestrator(None)
            .run(
                &GroupSnapshot::default(),
                &fx.output_root(),
                &RequestId::parse("9").unwrap(),
            )
            .await
            .unwrap();

        assert!(report.manifest.is_empty());
        assert_eq!(
            std::fs::read_to_string(report.manifest_path).unwrap(),
            "{\n  \"9\": []\n}"
        );
    }
}
