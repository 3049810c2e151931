//! Detection model provisioning.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::detector::DetectorSettings;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::write_atomic;

const MODEL_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Make sure the model file named by `settings` exists, downloading it from
/// `settings.model_url` when it does not.
pub async fn ensure_model(settings: &DetectorSettings) -> MediaResult<PathBuf> {
    let path = &settings.model_path;
    if path.exists() {
        return Ok(path.clone());
    }

    let Some(url) = settings.model_url.as_deref() else {
        return Err(MediaError::model_not_found(format!(
            "{} (set MODEL_URL to download it)",
            path.display()
        )));
    };

    info!(url, path = %path.display(), "Detection model missing, downloading");

    let http = Client::builder().timeout(MODEL_DOWNLOAD_TIMEOUT).build()?;
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::model_not_found(format!(
            "download from {} failed with HTTP {}",
            url, status
        )));
    }

    let body = response.bytes().await?;
    if body.is_empty() {
        return Err(MediaError::model_not_found(format!(
            "download from {} returned an empty body",
            url
        )));
    }
    write_atomic(path, &body).await?;

    info!(path = %path.display(), bytes = body.len(), "Detection model downloaded");
    Ok(path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(dir: &TempDir, url: Option<String>) -> DetectorSettings {
        DetectorSettings {
            model_path: dir.path().join("models").join("yolov8n.onnx"),
            model_url: url,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_existing_model_is_kept() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, None);
        std::fs::create_dir_all(settings.model_path.parent().unwrap()).unwrap();
        std::fs::write(&settings.model_path, b"onnx").unwrap();

        assert_eq!(ensure_model(&settings).await.unwrap(), settings.model_path);
    }

    #[tokio::test]
    async fn test_missing_model_without_url() {
        let dir = TempDir::new().unwrap();
        let err = ensure_model(&settings(&dir, None)).await.unwrap_err();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_downloads_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/yolov8n.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"weights".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, Some(format!("{}/yolov8n.onnx", server.uri())));
        let path = ensure_model(&settings).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, Some(format!("{}/m.onnx", server.uri())));
        assert!(ensure_model(&settings).await.is_err());
        assert!(!settings.model_path.exists());
    }
}
