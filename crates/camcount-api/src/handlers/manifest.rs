//! `GET /get`: fetch one camera group and return its manifest.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::info;

use camcount_models::RequestManifest;

use crate::error::{ApiError, ApiResult};
use crate::middleware::HttpRequestId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ManifestQuery {
    pub id: Option<String>,
}

/// Download and process the requested group, then answer with the manifest
/// that was just persisted.
pub async fn get_manifest(
    State(state): State<AppState>,
    Extension(HttpRequestId(http_id)): Extension<HttpRequestId>,
    Query(query): Query<ManifestQuery>,
) -> ApiResult<Json<RequestManifest>> {
    let production = state.config.is_production();
    run_request(state, &http_id, query)
        .await
        .map_err(|e| e.redact(production))
}

async fn run_request(
    state: AppState,
    http_id: &str,
    query: ManifestQuery,
) -> ApiResult<Json<RequestManifest>> {
    let group_id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("No id parameter provided"))?;

    info!(http_request_id = %http_id, group_id = %group_id, "Manifest requested");

    // Run detached so a client disconnect cannot abort a half-written run.
    let pipeline = state.pipeline.clone();
    let report = tokio::spawn(async move { pipeline.run_group(&group_id).await })
        .await
        .map_err(|e| ApiError::internal(format!("pipeline task failed: {}", e)))??;

    Ok(Json(report.manifest))
}
