//! In-memory doubles for queue tests.
//!
//! The stores mirror the PostgreSQL transition predicates exactly, so the
//! state machine can be exercised without a database. The notifier records
//! every published event for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domains::thumbnails::{ArtifactMeta, RecordStatus, RecordStore, ThumbnailRecord};
use crate::kernel::notifications::{
    ThumbnailEvent, ThumbnailNotifier, EVENT_THUMBNAIL_STATUS_CHANGED,
};

use super::error::QueueError;
use super::job::{EnqueueRequest, JobStatus, ThumbnailJob};
use super::store::JobStore;

// ============================================================================
// Job store
// ============================================================================

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<i64, ThumbnailJob>>,
    next_id: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Every job, in id order.
    pub fn jobs(&self) -> Vec<ThumbnailJob> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Move a claim into the past, standing in for an advancing clock.
    pub fn backdate_claim(&self, job_id: i64, minutes: i64) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get_mut(&job_id) {
            if let Some(claimed_at) = job.claimed_at {
                job.claimed_at = Some(claimed_at - Duration::minutes(minutes));
            }
        }
    }

    fn new_job(&self, request: &EnqueueRequest) -> ThumbnailJob {
        let now = Utc::now();
        ThumbnailJob {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            model_id: request.model_id,
            model_version_id: request.model_version_id,
            model_hash: request.model_hash.clone(),
            status: JobStatus::Pending,
            attempt_count: 0,
            max_attempts: request.max_attempts,
            lock_timeout_minutes: request.lock_timeout_minutes,
            claimed_by: None,
            claimed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_or_create(
        &self,
        request: &EnqueueRequest,
    ) -> Result<(ThumbnailJob, bool), QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = jobs
            .values()
            .find(|j| j.model_hash == request.model_hash && !j.status.is_terminal())
        {
            return Ok((existing.clone(), false));
        }

        let job = self.new_job(request);
        jobs.insert(job.id, job.clone());
        Ok((job, true))
    }

    async fn find(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned())
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<ThumbnailJob>, QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.attempt_count < j.max_attempts)
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.status = JobStatus::Processing;
        job.claimed_by = Some(worker_id.to_string());
        job.claimed_at = Some(Utc::now());
        job.attempt_count += 1;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Processing {
            return Ok(None);
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.claimed_by = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn fail(
        &self,
        job_id: i64,
        error_message: &str,
    ) -> Result<Option<ThumbnailJob>, QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(None);
        }

        job.status = if job.attempt_count >= job.max_attempts {
            JobStatus::Dead
        } else {
            JobStatus::Pending
        };
        job.error_message = Some(error_message.to_string());
        job.claimed_by = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn reset(&self, job_id: i64) -> Result<Option<ThumbnailJob>, QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

        let hash = match jobs.get(&job_id) {
            Some(job) => job.model_hash.clone(),
            None => return Ok(None),
        };

        // Mirrors the partial unique index: reviving this job must not
        // produce a second in-flight job for the same content.
        let conflict = jobs
            .values()
            .any(|j| j.id != job_id && j.model_hash == hash && !j.status.is_terminal());
        if conflict {
            return Err(QueueError::Validation(
                "another active job exists for this model hash".into(),
            ));
        }

        let job = jobs.get_mut(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
        job.status = JobStatus::Pending;
        job.attempt_count = 0;
        job.claimed_by = None;
        job.claimed_at = None;
        job.error_message = None;
        job.completed_at = None;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn cancel_active_for_model(
        &self,
        model_id: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut cancelled = Vec::new();

        for job in jobs.values_mut() {
            if job.model_id == model_id && !job.status.is_terminal() {
                job.status = JobStatus::Cancelled;
                job.claimed_by = None;
                job.claimed_at = None;
                job.updated_at = Utc::now();
                cancelled.push(job.clone());
            }
        }

        cancelled.sort_by_key(|j| j.id);
        Ok(cancelled)
    }

    async fn sweep_expired(&self) -> Result<Vec<ThumbnailJob>, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut swept = Vec::new();

        for job in jobs.values_mut() {
            if job.status != JobStatus::Processing {
                continue;
            }
            let Some(claimed_at) = job.claimed_at else {
                continue;
            };
            if claimed_at + Duration::minutes(job.lock_timeout_minutes as i64) >= now {
                continue;
            }

            if job.attempt_count >= job.max_attempts {
                job.status = JobStatus::Dead;
                job.error_message = Some("lease expired on final attempt".to_string());
            } else {
                job.status = JobStatus::Pending;
            }
            job.claimed_by = None;
            job.claimed_at = None;
            job.updated_at = now;
            swept.push(job.clone());
        }

        swept.sort_by_key(|j| j.id);
        Ok(swept)
    }

    async fn find_latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailJob>, QueueError> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|j| j.model_id == model_id)
            .max_by_key(|j| j.id)
            .cloned())
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ThumbnailJob>, QueueError> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| std::cmp::Reverse(j.id));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

// ============================================================================
// Record store
// ============================================================================

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<i64, ThumbnailRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ThumbnailRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        records.sort_by_key(|r| r.model_version_id);
        records
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn ensure_pending(
        &self,
        model_version_id: i64,
        model_id: i64,
    ) -> Result<ThumbnailRecord, QueueError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .entry(model_version_id)
            .or_insert_with(|| ThumbnailRecord {
                model_version_id,
                model_id,
                status: RecordStatus::Pending,
                file_ref: None,
                width: None,
                height: None,
                size_bytes: None,
                error_message: None,
                created_at: Utc::now(),
                processed_at: None,
            });
        Ok(record.clone())
    }

    async fn get(&self, model_version_id: i64) -> Result<Option<ThumbnailRecord>, QueueError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&model_version_id)
            .cloned())
    }

    async fn latest_for_model(
        &self,
        model_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|r| r.model_id == model_id)
            .max_by_key(|r| r.model_version_id)
            .cloned())
    }

    async fn mark_processing(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = records.get_mut(&model_version_id) else {
            return Ok(None);
        };
        if !matches!(record.status, RecordStatus::Pending | RecordStatus::Failed) {
            return Ok(None);
        }
        record.status = RecordStatus::Processing;
        Ok(Some(record.clone()))
    }

    async fn mark_ready(
        &self,
        model_version_id: i64,
        model_id: i64,
        artifact: &ArtifactMeta,
    ) -> Result<ThumbnailRecord, QueueError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .entry(model_version_id)
            .or_insert_with(|| ThumbnailRecord {
                model_version_id,
                model_id,
                status: RecordStatus::Pending,
                file_ref: None,
                width: None,
                height: None,
                size_bytes: None,
                error_message: None,
                created_at: Utc::now(),
                processed_at: None,
            });
        record.status = RecordStatus::Ready;
        record.file_ref = Some(artifact.file_ref.clone());
        record.width = Some(artifact.width);
        record.height = Some(artifact.height);
        record.size_bytes = Some(artifact.size_bytes);
        record.error_message = None;
        record.processed_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn mark_failed(
        &self,
        model_version_id: i64,
        model_id: i64,
        error_message: &str,
    ) -> Result<ThumbnailRecord, QueueError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .entry(model_version_id)
            .or_insert_with(|| ThumbnailRecord {
                model_version_id,
                model_id,
                status: RecordStatus::Pending,
                file_ref: None,
                width: None,
                height: None,
                size_bytes: None,
                error_message: None,
                created_at: Utc::now(),
                processed_at: None,
            });
        record.status = RecordStatus::Failed;
        record.file_ref = None;
        record.width = None;
        record.height = None;
        record.size_bytes = None;
        record.error_message = Some(error_message.to_string());
        record.processed_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn reset_pending(
        &self,
        model_version_id: i64,
    ) -> Result<Option<ThumbnailRecord>, QueueError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = records.get_mut(&model_version_id) else {
            return Ok(None);
        };
        record.status = RecordStatus::Pending;
        record.file_ref = None;
        record.width = None;
        record.height = None;
        record.size_bytes = None;
        record.error_message = None;
        record.processed_at = None;
        Ok(Some(record.clone()))
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Records every published event for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ThumbnailEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ThumbnailEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record-status events published for one model version.
    pub fn record_events_for_version(&self, model_version_id: i64) -> Vec<ThumbnailEvent> {
        self.events()
            .into_iter()
            .filter(|e| {
                e.kind == EVENT_THUMBNAIL_STATUS_CHANGED && e.model_version_id == model_version_id
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl ThumbnailNotifier for RecordingNotifier {
    async fn publish(&self, event: &ThumbnailEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
