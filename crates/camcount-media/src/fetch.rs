//! HTTP clip fetcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use camcount_models::{CameraDescriptor, ClipRecord};

use crate::error::{MediaError, MediaResult};
use crate::trim::ClipTrimmer;

/// Downloads one clip per camera and applies the trim policy.
///
/// Fetch problems never propagate: they end up in the returned
/// [`ClipRecord`] so one dead camera cannot sink the rest of a run.
#[derive(Clone)]
pub struct ClipFetcher {
    http: Client,
    trimmer: Arc<dyn ClipTrimmer>,
}

impl ClipFetcher {
    pub fn new(timeout: Duration, trimmer: Arc<dyn ClipTrimmer>) -> MediaResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, trimmer })
    }

    /// Fetch the clip of `camera` at `timestamp` into `target_dir`.
    pub async fn fetch(
        &self,
        camera: &CameraDescriptor,
        timestamp: i64,
        target_dir: &Path,
    ) -> ClipRecord {
        match self.try_fetch(camera, timestamp, target_dir).await {
            Ok(path) => {
                debug!(
                    group_id = %camera.group_id,
                    camera_id = %camera.camera_id,
                    path = %path.display(),
                    "Fetched clip"
                );
                ClipRecord::fetched(camera.clone(), timestamp, path)
            }
            Err(e) => {
                warn!(
                    group_id = %camera.group_id,
                    camera_id = %camera.camera_id,
                    url = %camera.fetch_url,
                    "Failed to fetch clip: {}",
                    e
                );
                ClipRecord::failed(camera.clone(), timestamp, e.to_string())
            }
        }
    }

    async fn try_fetch(
        &self,
        camera: &CameraDescriptor,
        timestamp: i64,
        target_dir: &Path,
    ) -> MediaResult<PathBuf> {
        let response = self
            .http
            .get(&camera.fetch_url)
            .query(&[("time", timestamp.to_string())])
            .send()
            .await
            .map_err(|e| MediaError::fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::fetch(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MediaError::fetch(format!("reading body: {}", e)))?;

        tokio::fs::create_dir_all(target_dir).await?;
        let path = target_dir.join(camera.clip_file_name(timestamp));
        tokio::fs::write(&path, &body).await?;
        let path = tokio::fs::canonicalize(&path).await?;

        if let Err(e) = self.trimmer.trim(&path).await {
            warn!(
                group_id = %camera.group_id,
                camera_id = %camera.camera_id,
                path = %path.display(),
                "Keeping untrimmed clip: {}",
                e
            );
        }

        Ok(path)
    }
}
