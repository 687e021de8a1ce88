//! Worker-facing job endpoints.
//!
//! POST /thumbnail-jobs                 - enqueue (upload pipeline)
//! GET  /thumbnail-jobs?status=&limit=  - operator listing
//! POST /thumbnail-jobs/dequeue         - claim the next pending job
//! GET  /thumbnail-jobs/:id             - inspect one job
//! POST /thumbnail-jobs/:id/complete    - report success with the artifact
//! POST /thumbnail-jobs/:id/fail        - report a failed attempt
//! POST /thumbnail-jobs/:id/retry      - operator reset

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::thumbnails::ArtifactMeta;
use crate::kernel::jobs::{EnqueueRequest, JobStatus, ThumbnailJob};
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// Job shape on the wire.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: i64,
    pub model_id: i64,
    pub model_version_id: i64,
    pub model_hash: String,
    pub status: JobStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<ThumbnailJob> for JobPayload {
    fn from(job: ThumbnailJob) -> Self {
        Self {
            id: job.id,
            model_id: job.model_id,
            model_version_id: job.model_version_id,
            model_hash: job.model_hash,
            status: job.status,
            attempt_count: job.attempt_count,
            max_attempts: job.max_attempts,
            claimed_by: job.claimed_by,
            claimed_at: job.claimed_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            error_message: job.error_message,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueBody {
    pub model_id: i64,
    pub model_version_id: i64,
    pub model_hash: String,
    pub max_attempts: Option<i32>,
    pub lock_timeout_minutes: Option<i32>,
}

pub async fn enqueue_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<EnqueueBody>,
) -> Result<Response, ApiError> {
    let mut request = EnqueueRequest::new(body.model_id, body.model_version_id, body.model_hash);
    if let Some(max_attempts) = body.max_attempts {
        request = request.with_max_attempts(max_attempts);
    }
    if let Some(minutes) = body.lock_timeout_minutes {
        request = request.with_lock_timeout_minutes(minutes);
    }

    let outcome = state.queue.enqueue(request).await?;
    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(JobPayload::from(outcome.into_job()))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
}

pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<JobPayload>>, ApiError> {
    let jobs = state
        .queue
        .list(params.status, params.limit.unwrap_or(100))
        .await?;
    Ok(Json(jobs.into_iter().map(JobPayload::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DequeueBody {
    pub worker_id: String,
}

/// 200 with the claimed job, or 204 when nothing is pending.
pub async fn dequeue_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<DequeueBody>,
) -> Result<Response, ApiError> {
    match state.queue.dequeue(&body.worker_id).await? {
        Some(job) => Ok(Json(JobPayload::from(job)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<JobPayload>, ApiError> {
    let job = state.queue.get(job_id).await?;
    Ok(Json(JobPayload::from(job)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    pub file_ref: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
}

pub async fn complete_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<i64>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<JobPayload>, ApiError> {
    let artifact = ArtifactMeta {
        file_ref: body.file_ref,
        size_bytes: body.size_bytes,
        width: body.width,
        height: body.height,
    };
    let job = state.queue.mark_completed(job_id, artifact).await?;
    Ok(Json(JobPayload::from(job)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailBody {
    pub error_message: String,
}

pub async fn fail_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<i64>,
    Json(body): Json<FailBody>,
) -> Result<Json<JobPayload>, ApiError> {
    let job = state.queue.mark_failed(job_id, &body.error_message).await?;
    Ok(Json(JobPayload::from(job)))
}

pub async fn retry_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<JobPayload>, ApiError> {
    let job = state.queue.retry(job_id).await?;
    Ok(Json(JobPayload::from(job)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: usize,
}

/// Cancels every in-flight job for a model; called when a version goes away.
pub async fn cancel_model_jobs_handler(
    Extension(state): Extension<AppState>,
    Path(model_id): Path<i64>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.queue.cancel_active_for_model(model_id).await?;
    Ok(Json(CancelResponse { cancelled }))
}
