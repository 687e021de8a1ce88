//! Application setup and router configuration.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::thumbnails::ThumbnailRecordService;
use crate::kernel::blobs::BlobStore;
use crate::kernel::jobs::ThumbnailQueue;
use crate::kernel::stream_hub::StreamHub;
use crate::server::routes::{
    blob_upload_handler, cancel_model_jobs_handler, complete_job_handler, dequeue_handler,
    enqueue_handler, fail_job_handler, get_job_handler, health_handler, list_jobs_handler,
    model_source_download_handler, model_source_upload_handler, regenerate_handler,
    retry_job_handler, stream_handler, thumbnail_file_handler, thumbnail_status_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<ThumbnailQueue>,
    pub records: Arc<ThumbnailRecordService>,
    pub blobs: Arc<dyn BlobStore>,
    pub stream_hub: StreamHub,
    /// Present in database-backed deployments; used for pool metrics only.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        queue: Arc<ThumbnailQueue>,
        records: Arc<ThumbnailRecordService>,
        blobs: Arc<dyn BlobStore>,
        stream_hub: StreamHub,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            queue,
            records,
            blobs,
            stream_hub,
            db_pool,
        }
    }
}

/// Model uploads top out at 256 MiB.
const MAX_SOURCE_BYTES: usize = 256 * 1024 * 1024;

/// Build the axum application.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Worker control plane
        .route("/thumbnail-jobs", post(enqueue_handler).get(list_jobs_handler))
        .route("/thumbnail-jobs/dequeue", post(dequeue_handler))
        .route("/thumbnail-jobs/:id", get(get_job_handler))
        .route("/thumbnail-jobs/:id/complete", post(complete_job_handler))
        .route("/thumbnail-jobs/:id/fail", post(fail_job_handler))
        .route("/thumbnail-jobs/:id/retry", post(retry_job_handler))
        // Client-facing artifact status
        .route("/models/:id/thumbnail", get(thumbnail_status_handler))
        .route("/models/:id/thumbnail/file", get(thumbnail_file_handler))
        .route(
            "/models/:id/thumbnail/regenerate",
            post(regenerate_handler),
        )
        .route(
            "/models/:id/thumbnail-jobs/cancel",
            post(cancel_model_jobs_handler),
        )
        // Blob surface for workers and dev tooling
        .route(
            "/model-versions/:id/file",
            put(model_source_upload_handler).get(model_source_download_handler),
        )
        .route("/blobs", post(blob_upload_handler))
        // Push channel; polling the record endpoints is always sufficient
        .route("/streams/:topic", get(stream_handler))
        .layer(Extension(state))
        .layer(DefaultBodyLimit::max(MAX_SOURCE_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
