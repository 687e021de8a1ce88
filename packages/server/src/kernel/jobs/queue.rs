//! Queue service: the state machine over the job store.
//!
//! Enqueue dedups on content hash, dequeue claims with a lease, completion
//! and failure drive the thumbnail record, and every event is published
//! explicitly from here so the write order stays auditable. All operations
//! are short atomic store calls; the service itself holds no state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domains::thumbnails::{ArtifactMeta, ThumbnailRecordService};
use crate::kernel::notifications::{ThumbnailEvent, ThumbnailNotifier};

use super::error::QueueError;
use super::job::{
    truncate_error_message, EnqueueRequest, JobStatus, ThumbnailJob, MAX_ERROR_MESSAGE_LEN,
};
use super::store::JobStore;

/// Result of an enqueue that distinguishes dedup hits.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// A new pending job was created.
    Created(ThumbnailJob),
    /// An in-flight job already covers this content; returned unchanged.
    Existing(ThumbnailJob),
}

impl EnqueueOutcome {
    pub fn job(&self) -> &ThumbnailJob {
        match self {
            EnqueueOutcome::Created(job) | EnqueueOutcome::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> ThumbnailJob {
        match self {
            EnqueueOutcome::Created(job) | EnqueueOutcome::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueOutcome::Created(_))
    }
}

pub struct ThumbnailQueue {
    store: Arc<dyn JobStore>,
    records: Arc<ThumbnailRecordService>,
    notifier: Arc<dyn ThumbnailNotifier>,
}

impl ThumbnailQueue {
    pub fn new(
        store: Arc<dyn JobStore>,
        records: Arc<ThumbnailRecordService>,
        notifier: Arc<dyn ThumbnailNotifier>,
    ) -> Self {
        Self {
            store,
            records,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn records(&self) -> &Arc<ThumbnailRecordService> {
        &self.records
    }

    /// Enqueue a render job, collapsing duplicate content.
    ///
    /// At most one non-terminal job exists per model hash; a second enqueue
    /// of the same bytes returns the in-flight job untouched. Terminal jobs
    /// never block a fresh enqueue, so regeneration stays legal.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueOutcome, QueueError> {
        request.validate()?;

        self.records
            .ensure_pending(request.model_version_id, request.model_id)
            .await?;

        let (job, created) = self.store.get_or_create(&request).await?;
        if created {
            info!(
                job_id = job.id,
                model_id = job.model_id,
                model_version_id = job.model_version_id,
                "enqueued thumbnail job"
            );
            self.notifier.publish(&ThumbnailEvent::job_changed(&job)).await;
            Ok(EnqueueOutcome::Created(job))
        } else {
            debug!(
                job_id = job.id,
                model_hash = %request.model_hash,
                "enqueue deduplicated to existing job"
            );
            Ok(EnqueueOutcome::Existing(job))
        }
    }

    /// Claim the oldest pending job for a worker.
    ///
    /// The claim is one atomic statement; a caller that disappears right
    /// after it leaves the job in processing for the sweeper to reclaim.
    pub async fn dequeue(&self, worker_id: &str) -> Result<Option<ThumbnailJob>, QueueError> {
        if worker_id.trim().is_empty() {
            return Err(QueueError::Validation("workerId must not be empty".into()));
        }

        let Some(job) = self.store.claim_next(worker_id).await? else {
            return Ok(None);
        };

        info!(
            job_id = job.id,
            worker_id,
            attempt = job.attempt_count,
            "job claimed"
        );

        self.records
            .on_job_started(job.model_version_id, job.model_id)
            .await?;
        self.notifier.publish(&ThumbnailEvent::job_changed(&job)).await;

        Ok(Some(job))
    }

    /// Report successful completion with the rendered artifact.
    ///
    /// Idempotent: a duplicate report for a completed job is a no-op, and a
    /// report for a job the sweeper already reclaimed is logged and ignored.
    pub async fn mark_completed(
        &self,
        job_id: i64,
        artifact: ArtifactMeta,
    ) -> Result<ThumbnailJob, QueueError> {
        artifact.validate()?;

        match self.store.complete(job_id).await? {
            Some(job) => {
                let record = self
                    .records
                    .on_job_completed(job.model_version_id, job.model_id, &artifact)
                    .await?;
                info!(
                    job_id = job.id,
                    model_version_id = job.model_version_id,
                    file_ref = %artifact.file_ref,
                    "job completed"
                );
                self.notifier
                    .publish(&ThumbnailEvent::record_changed(&record).with_job(&job))
                    .await;
                Ok(job)
            }
            None => {
                let current = self
                    .store
                    .find(job_id)
                    .await?
                    .ok_or(QueueError::JobNotFound(job_id))?;
                if current.status == JobStatus::Completed {
                    debug!(job_id, "ignoring duplicate completion report");
                } else {
                    warn!(
                        job_id,
                        status = ?current.status,
                        "ignoring completion report for job not in processing"
                    );
                }
                Ok(current)
            }
        }
    }

    /// Report a failed attempt.
    ///
    /// Attempts remaining re-queue the job; a spent budget dead-letters it
    /// and fails the thumbnail record. Reports against terminal jobs are
    /// logged and ignored.
    pub async fn mark_failed(
        &self,
        job_id: i64,
        error_message: &str,
    ) -> Result<ThumbnailJob, QueueError> {
        let message = truncate_error_message(error_message, MAX_ERROR_MESSAGE_LEN);

        match self.store.fail(job_id, &message).await? {
            Some(job) if job.status == JobStatus::Dead => {
                warn!(
                    job_id = job.id,
                    attempts = job.attempt_count,
                    error = %message,
                    "job dead-lettered"
                );
                let record = self
                    .records
                    .on_job_failed(job.model_version_id, job.model_id, &message)
                    .await?;
                self.notifier
                    .publish(&ThumbnailEvent::record_changed(&record).with_job(&job))
                    .await;
                Ok(job)
            }
            Some(job) => {
                info!(
                    job_id = job.id,
                    attempts = job.attempt_count,
                    error = %message,
                    "job failed, re-queued for retry"
                );
                self.notifier.publish(&ThumbnailEvent::job_changed(&job)).await;
                Ok(job)
            }
            None => {
                let current = self
                    .store
                    .find(job_id)
                    .await?
                    .ok_or(QueueError::JobNotFound(job_id))?;
                warn!(
                    job_id,
                    status = ?current.status,
                    "ignoring failure report for terminal job"
                );
                Ok(current)
            }
        }
    }

    /// Admin override: reset any job to pending with a fresh attempt budget.
    pub async fn retry(&self, job_id: i64) -> Result<ThumbnailJob, QueueError> {
        let job = self
            .store
            .reset(job_id)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;

        info!(job_id = job.id, "job reset by operator");
        self.notifier.publish(&ThumbnailEvent::job_changed(&job)).await;
        Ok(job)
    }

    /// Cancel every non-terminal job for a model. Returns the count.
    pub async fn cancel_active_for_model(&self, model_id: i64) -> Result<usize, QueueError> {
        let cancelled = self.store.cancel_active_for_model(model_id).await?;
        for job in &cancelled {
            info!(job_id = job.id, model_id, "job cancelled");
            self.notifier.publish(&ThumbnailEvent::job_changed(job)).await;
        }
        Ok(cancelled.len())
    }

    /// Cancel in-flight work and schedule a fresh render of the model's
    /// newest version.
    pub async fn regenerate(&self, model_id: i64) -> Result<ThumbnailJob, QueueError> {
        let latest = self
            .store
            .find_latest_for_model(model_id)
            .await?
            .ok_or(QueueError::ModelNotFound(model_id))?;

        self.cancel_active_for_model(model_id).await?;

        let record = self
            .records
            .on_regeneration_requested(latest.model_version_id, model_id)
            .await?;
        self.notifier
            .publish(&ThumbnailEvent::record_changed(&record))
            .await;

        let outcome = self
            .enqueue(EnqueueRequest::new(
                model_id,
                latest.model_version_id,
                latest.model_hash.clone(),
            ))
            .await?;
        Ok(outcome.into_job())
    }

    /// Reclaim expired leases once. Returns how many jobs were transitioned.
    ///
    /// Reclaims back to pending are silent; only a sweep that dead-letters
    /// the final attempt surfaces anywhere.
    pub async fn sweep_once(&self) -> Result<usize, QueueError> {
        let swept = self.store.sweep_expired().await?;

        for job in &swept {
            if job.status == JobStatus::Dead {
                warn!(
                    job_id = job.id,
                    attempts = job.attempt_count,
                    "expired lease dead-lettered job"
                );
                let message = job
                    .error_message
                    .as_deref()
                    .unwrap_or("lease expired on final attempt");
                let record = self
                    .records
                    .on_job_failed(job.model_version_id, job.model_id, message)
                    .await?;
                self.notifier
                    .publish(&ThumbnailEvent::record_changed(&record).with_job(job))
                    .await;
            } else {
                debug!(job_id = job.id, "expired lease returned job to pending");
            }
        }

        Ok(swept.len())
    }

    pub async fn get(&self, job_id: i64) -> Result<ThumbnailJob, QueueError> {
        self.store
            .find(job_id)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError> {
        self.store.list(status, limit.clamp(1, 500)).await
    }
}
