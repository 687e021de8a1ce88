//! Client-facing thumbnail endpoints.
//!
//! The record row is canonical: clients poll these endpoints and treat any
//! push notification as a hint to poll sooner.

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domains::thumbnails::{RecordStatus, ThumbnailRecord};
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::routes::jobs::JobPayload;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailStatusPayload {
    pub model_id: i64,
    pub model_version_id: i64,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<ThumbnailRecord> for ThumbnailStatusPayload {
    fn from(record: ThumbnailRecord) -> Self {
        Self {
            model_id: record.model_id,
            model_version_id: record.model_version_id,
            status: record.status,
            file_ref: record.file_ref,
            width: record.width,
            height: record.height,
            size_bytes: record.size_bytes,
            error_message: record.error_message,
            created_at: record.created_at,
            processed_at: record.processed_at,
        }
    }
}

/// Status of the newest version's thumbnail for a model.
pub async fn thumbnail_status_handler(
    Extension(state): Extension<AppState>,
    Path(model_id): Path<i64>,
) -> Result<Json<ThumbnailStatusPayload>, ApiError> {
    let record = state
        .records
        .latest_for_model(model_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no thumbnail for model {model_id}")))?;
    Ok(Json(ThumbnailStatusPayload::from(record)))
}

/// The rendered artifact bytes.
pub async fn thumbnail_file_handler(
    Extension(state): Extension<AppState>,
    Path(model_id): Path<i64>,
) -> Result<Response, ApiError> {
    let record = state
        .records
        .latest_for_model(model_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no thumbnail for model {model_id}")))?;

    let file_ref = match (record.status, record.file_ref) {
        (RecordStatus::Ready, Some(file_ref)) => file_ref,
        _ => {
            return Err(ApiError::not_found(format!(
                "thumbnail for model {model_id} is not ready"
            )))
        }
    };

    let bytes = state
        .blobs
        .get(&file_ref)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("artifact {file_ref} is missing")))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

/// Schedule a re-render of the model's newest version.
pub async fn regenerate_handler(
    Extension(state): Extension<AppState>,
    Path(model_id): Path<i64>,
) -> Result<Response, ApiError> {
    let job = state.queue.regenerate(model_id).await?;
    Ok((StatusCode::ACCEPTED, Json(JobPayload::from(job))).into_response())
}
