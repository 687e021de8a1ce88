//! Blob surface for workers and dev tooling.
//!
//! Sources go in by version id, artifacts come back content-addressed.
//! Ingestion of real uploads lives upstream; these endpoints are the
//! minimal surface the render fleet needs.

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::hash::sha256_hex;
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUploadParams {
    pub model_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUploadResponse {
    pub model_id: i64,
    pub model_version_id: i64,
    /// Fingerprint of the stored bytes; the caller passes this to enqueue.
    pub model_hash: String,
    pub size_bytes: usize,
}

/// PUT /model-versions/:id/file?modelId=
///
/// Stores source bytes for a version and makes sure its thumbnail record
/// exists in pending.
pub async fn model_source_upload_handler(
    Extension(state): Extension<AppState>,
    Path(model_version_id): Path<i64>,
    Query(params): Query<SourceUploadParams>,
    body: Bytes,
) -> Result<Json<SourceUploadResponse>, ApiError> {
    if model_version_id <= 0 || params.model_id <= 0 {
        return Err(ApiError::bad_request("ids must be positive"));
    }
    if body.is_empty() {
        return Err(ApiError::bad_request("source file must not be empty"));
    }

    let model_hash = sha256_hex(&body);
    let size_bytes = body.len();

    state
        .blobs
        .put_model_source(model_version_id, body)
        .await?;
    state
        .records
        .ensure_pending(model_version_id, params.model_id)
        .await?;

    Ok(Json(SourceUploadResponse {
        model_id: params.model_id,
        model_version_id,
        model_hash,
        size_bytes,
    }))
}

/// GET /model-versions/:id/file
pub async fn model_source_download_handler(
    Extension(state): Extension<AppState>,
    Path(model_version_id): Path<i64>,
) -> Result<Response, ApiError> {
    let bytes = state
        .blobs
        .get_model_source(model_version_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no source for model version {model_version_id}"))
        })?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobUploadResponse {
    pub file_ref: String,
    pub size_bytes: usize,
}

/// POST /blobs
///
/// Content-addressed artifact upload; duplicate bytes return the same
/// reference.
pub async fn blob_upload_handler(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Json<BlobUploadResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("artifact must not be empty"));
    }

    let size_bytes = body.len();
    let file_ref = state.blobs.put(body).await?;
    Ok(Json(BlobUploadResponse {
        file_ref,
        size_bytes,
    }))
}
