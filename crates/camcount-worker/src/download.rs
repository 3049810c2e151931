//! Download orchestrator: one task per camera group.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{error, info};

use camcount_media::ClipFetcher;
use camcount_models::{fetch_timestamp_now, CameraRegistry, ClipRecord, GroupSnapshot};

use crate::error::WorkerResult;
use crate::fan_out::join_ordered;
use crate::metrics;

/// Fetches every camera of a registry and assembles the group snapshot.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    fetcher: ClipFetcher,
    download_dir: PathBuf,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: ClipFetcher, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            download_dir: download_dir.into(),
        }
    }

    /// Fetch all cameras, stamped with the current time.
    pub async fn run(&self, registry: &CameraRegistry) -> WorkerResult<GroupSnapshot> {
        self.run_at(registry, fetch_timestamp_now()).await
    }

    /// Fetch all cameras with an explicit run timestamp.
    ///
    /// Returns only after every group task has finished. The snapshot always
    /// has one entry per group and one record per camera, whatever failed.
    pub async fn run_at(
        &self,
        registry: &CameraRegistry,
        timestamp: i64,
    ) -> WorkerResult<GroupSnapshot> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let started = Instant::now();

        info!(
            groups = registry.group_count(),
            cameras = registry.camera_count(),
            timestamp,
            "Starting download run"
        );

        let tasks = registry.groups().map(|(group_id, cameras)| {
            let fetcher = self.fetcher.clone();
            let target_dir = self.download_dir.clone();
            let cameras = cameras.clone();
            let group_id = group_id.clone();
            async move {
                let mut clips = Vec::with_capacity(cameras.len());
                for camera in &cameras {
                    let clip = fetcher.fetch(camera, timestamp, &target_dir).await;
                    metrics::record_fetch(&group_id, clip.is_fetched());
                    clips.push(clip);
                }
                clips
            }
        });
        let outcomes = join_ordered(tasks, None).await;

        let mut groups = BTreeMap::new();
        for ((group_id, cameras), outcome) in registry.groups().zip(outcomes) {
            let clips = match outcome {
                Ok(clips) => clips,
                Err(failure) => {
                    error!(group_id = %group_id, "Download task failed: {}", failure);
                    ClipRecord::all_failed(cameras, timestamp, &failure.to_string())
                }
            };
            groups.insert(group_id.clone(), clips);
        }

        let snapshot = GroupSnapshot::from_groups(groups);
        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_download_duration(elapsed);
        info!(
            groups = snapshot.group_count(),
            clips = snapshot.clip_count(),
            fetched = snapshot.fetched_count(),
            elapsed_secs = elapsed,
            "Download run finished"
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcount_media::NoopTrimmer;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator(dir: &Path) -> DownloadOrchestrator {
        let fetcher = ClipFetcher::new(Duration::from_secs(5), Arc::new(NoopTrimmer)).unwrap();
        DownloadOrchestrator::new(fetcher, dir)
    }

    #[tokio::test]
    async fn test_snapshot_shape_survives_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"clip".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let raw = format!(
            r#"{{
                "1": [{{"name": "A", "camera": "a", "url": "{uri}/ok"}},
                      {{"name": "B", "camera": "b", "url": "{uri}/gone"}}],
                "2": [{{"name": "C", "camera": "c", "url": "{uri}/gone"}}],
                "3": []
            }}"#,
            uri = server.uri()
        );
        let registry = CameraRegistry::from_json_str(&raw).unwrap();

        let dir = TempDir::new().unwrap();
        let downloads = dir.path().join("downloaded_videos");
        let snapshot = orchestrator(&downloads).run_at(&registry, 99).await.unwrap();

        assert_eq!(snapshot.group_count(), 3);
        assert_eq!(snapshot.get("1").unwrap().len(), 2);
        assert_eq!(snapshot.get("2").unwrap().len(), 1);
        assert!(snapshot.get("3").unwrap().is_empty());
        assert_eq!(snapshot.fetched_count(), 1);

        let group1 = snapshot.get("1").unwrap();
        assert_eq!(group1[0].camera_id(), "a");
        assert!(group1[0].local_path().unwrap().ends_with("1_a_99.mp4"));
        assert!(!group1[1].is_fetched());
        assert!(downloads.is_dir());
    }

    #[tokio::test]
    async fn test_cameras_share_run_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;

        let raw = format!(
            r#"{{"1": [{{"name": "A", "camera": "a", "url": "{uri}/a"}}],
                 "2": [{{"name": "B", "camera": "b", "url": "{uri}/b"}}]}}"#,
            uri = server.uri()
        );
        let registry = CameraRegistry::from_json_str(&raw).unwrap();
        let dir = TempDir::new().unwrap();
        let snapshot = orchestrator(dir.path()).run(&registry).await.unwrap();

        let stamps: Vec<i64> = snapshot.clips().map(|c| c.fetch_timestamp).collect();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0], stamps[1]);
        for request in server.received_requests().await.unwrap() {
            let query = request.url.query().unwrap_or_default().to_string();
            assert_eq!(query, format!("time={}", stamps[0]));
        }
    }
}
