//! Job store trait and the PostgreSQL implementation.
//!
//! The store is the single synchronization point between workers: every
//! method is one atomic state transition. The queue service layers the
//! dedup, notification, and record bookkeeping on top.

use async_trait::async_trait;
use sqlx::PgPool;

use super::error::QueueError;
use super::job::{EnqueueRequest, JobStatus, ThumbnailJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Get-or-create keyed on `model_hash` over non-terminal jobs.
    ///
    /// Returns the job and whether this call created it.
    async fn get_or_create(
        &self,
        request: &EnqueueRequest,
    ) -> Result<(ThumbnailJob, bool), QueueError>;

    async fn find(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError>;

    /// Claim the oldest pending job for `worker_id`, bumping the attempt
    /// counter. At most one caller wins any given row.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<ThumbnailJob>, QueueError>;

    /// Processing -> completed. `None` when the row was not in processing.
    async fn complete(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError>;

    /// Record a failure; pending for retry or dead when attempts are spent.
    /// `None` when the row was terminal.
    async fn fail(
        &self,
        job_id: i64,
        error_message: &str,
    ) -> Result<Option<ThumbnailJob>, QueueError>;

    /// Admin reset to pending with `attempt_count = 0`.
    async fn reset(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError>;

    async fn cancel_active_for_model(
        &self,
        model_id: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError>;

    /// Reclaim expired leases; returns the transitioned rows.
    async fn sweep_expired(&self) -> Result<Vec<ThumbnailJob>, QueueError>;

    async fn find_latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailJob>, QueueError>;

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError>;

    /// Storage liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), QueueError>;
}

/// PostgreSQL-backed job store.
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn get_or_create(
        &self,
        request: &EnqueueRequest,
    ) -> Result<(ThumbnailJob, bool), QueueError> {
        if let Some(existing) = ThumbnailJob::find_active_by_hash(&request.model_hash, &self.pool).await? {
            return Ok((existing, false));
        }

        // The partial unique index on model_hash arbitrates concurrent
        // inserts; the loser re-reads the winning row.
        match ThumbnailJob::insert_pending(request, &self.pool).await? {
            Some(created) => Ok((created, true)),
            None => {
                let existing = ThumbnailJob::find_active_by_hash(&request.model_hash, &self.pool)
                    .await?
                    .ok_or_else(|| {
                        QueueError::Validation(format!(
                            "lost enqueue race for hash {} but no active job remains",
                            request.model_hash
                        ))
                    })?;
                Ok((existing, false))
            }
        }
    }

    async fn find(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::find_by_id(job_id, &self.pool).await?)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::claim_next(worker_id, &self.pool).await?)
    }

    async fn complete(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::complete(job_id, &self.pool).await?)
    }

    async fn fail(
        &self,
        job_id: i64,
        error_message: &str,
    ) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::fail(job_id, error_message, &self.pool).await?)
    }

    async fn reset(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError> {
        match ThumbnailJob::reset(job_id, &self.pool).await {
            Ok(job) => Ok(job),
            // Unique violation on the active-hash index: another live job
            // already covers this content.
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(QueueError::Validation(
                    "another active job exists for this model hash".into(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_active_for_model(
        &self,
        model_id: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::cancel_active_for_model(model_id, &self.pool).await?)
    }

    async fn sweep_expired(&self) -> Result<Vec<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::sweep_expired(&self.pool).await?)
    }

    async fn find_latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::find_latest_for_model(model_id, &self.pool).await?)
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError> {
        Ok(ThumbnailJob::list(status, limit, &self.pool).await?)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
