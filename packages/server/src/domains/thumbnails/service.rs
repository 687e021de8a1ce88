//! Record store trait and the service the queue drives.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::kernel::jobs::QueueError;

use super::record::{ArtifactMeta, ThumbnailRecord};

/// Persistence seam for thumbnail records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn ensure_pending(
        &self,
        model_version_id: i64,
        model_id: i64,
    ) -> Result<ThumbnailRecord, QueueError>;

    async fn get(&self, model_version_id: i64) -> Result<Option<ThumbnailRecord>, QueueError>;

    async fn latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError>;

    async fn mark_processing(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError>;

    async fn mark_ready(
        &self,
        model_version_id: i64,
        model_id: i64,
        artifact: &ArtifactMeta,
    ) -> Result<ThumbnailRecord, QueueError>;

    async fn mark_failed(
        &self,
        model_version_id: i64,
        model_id: i64,
        error_message: &str,
    ) -> Result<ThumbnailRecord, QueueError>;

    async fn reset_pending(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError>;
}

/// PostgreSQL-backed record store.
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn ensure_pending(
        &self,
        model_version_id: i64,
        model_id: i64,
    ) -> Result<ThumbnailRecord, QueueError> {
        Ok(ThumbnailRecord::ensure_pending(model_version_id, model_id, &self.pool).await?)
    }

    async fn get(&self, model_version_id: i64) -> Result<Option<ThumbnailRecord>, QueueError> {
        Ok(ThumbnailRecord::find(model_version_id, &self.pool).await?)
    }

    async fn latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        Ok(ThumbnailRecord::find_latest_for_model(model_id, &self.pool).await?)
    }

    async fn mark_processing(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        Ok(ThumbnailRecord::mark_processing(model_version_id, &self.pool).await?)
    }

    async fn mark_ready(
        &self,
        model_version_id: i64,
        model_id: i64,
        artifact: &ArtifactMeta,
    ) -> Result<ThumbnailRecord, QueueError> {
        Ok(ThumbnailRecord::mark_ready(model_version_id, model_id, artifact, &self.pool).await?)
    }

    async fn mark_failed(
        &self,
        model_version_id: i64,
        model_id: i64,
        error_message: &str,
    ) -> Result<ThumbnailRecord, QueueError> {
        Ok(ThumbnailRecord::mark_failed(model_version_id, model_id, error_message, &self.pool)
            .await?)
    }

    async fn reset_pending(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        Ok(ThumbnailRecord::reset_pending(model_version_id, &self.pool).await?)
    }
}

/// Domain operations over the record store.
///
/// The queue service calls these from its claim and completion paths and
/// publishes the resulting events itself, so the write order stays visible
/// in one place.
pub struct ThumbnailRecordService {
    store: Arc<dyn RecordStore>,
}

impl ThumbnailRecordService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Called when a version is first observed.
    pub async fn ensure_pending(
        &self,
        model_version_id: i64,
        model_id: i64,
    ) -> Result<ThumbnailRecord, QueueError> {
        self.store.ensure_pending(model_version_id, model_id).await
    }

    /// Called when a worker claims a job for this version.
    pub async fn on_job_started(
        &self,
        model_version_id: i64,
        model_id: i64,
    ) -> Result<ThumbnailRecord, QueueError> {
        self.store.ensure_pending(model_version_id, model_id).await?;
        match self.store.mark_processing(model_version_id).await? {
            Some(record) => Ok(record),
            // Already processing from an earlier attempt.
            None => self
                .store
                .get(model_version_id)
                .await?
                .ok_or(QueueError::RecordNotFound(model_version_id)),
        }
    }

    /// Called once a job completes; creates the record if it was never seen.
    pub async fn on_job_completed(
        &self,
        model_version_id: i64,
        model_id: i64,
        artifact: &ArtifactMeta,
    ) -> Result<ThumbnailRecord, QueueError> {
        artifact.validate()?;
        self.store
            .mark_ready(model_version_id, model_id, artifact)
            .await
    }

    /// Called only when a job dead-letters; retryable failures never touch
    /// the record.
    pub async fn on_job_failed(
        &self,
        model_version_id: i64,
        model_id: i64,
        error_message: &str,
    ) -> Result<ThumbnailRecord, QueueError> {
        self.store
            .mark_failed(model_version_id, model_id, error_message)
            .await
    }

    /// Called when an admin forces a re-render.
    pub async fn on_regeneration_requested(
        &self,
        model_version_id: i64,
        model_id: i64,
    ) -> Result<ThumbnailRecord, QueueError> {
        self.store.ensure_pending(model_version_id, model_id).await?;
        self.store
            .reset_pending(model_version_id)
            .await?
            .ok_or(QueueError::RecordNotFound(model_version_id))
    }

    pub async fn get(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        self.store.get(model_version_id).await
    }

    pub async fn latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        self.store.latest_for_model(model_id).await
    }
}
