//! Render job model for the thumbnail queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::hash::is_sha256_hex;

use super::error::QueueError;

/// Longest error message persisted on a job row.
pub const MAX_ERROR_MESSAGE_LEN: usize = 2000;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "thumbnail_job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed, // legacy rows only; retryable failures go straight back to pending
    Dead,
    Cancelled,
}

impl JobStatus {
    /// Terminal states never leave via the normal state machine; only the
    /// admin retry path can revive a dead or completed job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Dead | JobStatus::Cancelled
        )
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailJob {
    pub id: i64,

    // Render target
    pub model_id: i64,
    pub model_version_id: i64,
    /// SHA-256 of the source model bytes; dedup key for in-flight jobs.
    pub model_hash: String,

    // State
    pub status: JobStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,

    // Lease
    pub lock_timeout_minutes: i32,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,

    // Error tracking
    pub error_message: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a job.
///
/// Validated before touching storage; invalid requests never reach the
/// database.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub model_id: i64,
    pub model_version_id: i64,
    pub model_hash: String,
    pub max_attempts: i32,
    pub lock_timeout_minutes: i32,
}

impl EnqueueRequest {
    pub fn new(model_id: i64, model_version_id: i64, model_hash: impl Into<String>) -> Self {
        Self {
            model_id,
            model_version_id,
            model_hash: model_hash.into(),
            max_attempts: 3,
            lock_timeout_minutes: 10,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_lock_timeout_minutes(mut self, minutes: i32) -> Self {
        self.lock_timeout_minutes = minutes;
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.model_id <= 0 {
            return Err(QueueError::Validation("modelId must be positive".into()));
        }
        if self.model_version_id <= 0 {
            return Err(QueueError::Validation(
                "modelVersionId must be positive".into(),
            ));
        }
        if !is_sha256_hex(&self.model_hash) {
            return Err(QueueError::Validation(
                "modelHash must be a 64-character lowercase hex SHA-256".into(),
            ));
        }
        if self.max_attempts < 1 {
            return Err(QueueError::Validation("maxAttempts must be at least 1".into()));
        }
        if self.lock_timeout_minutes < 0 {
            return Err(QueueError::Validation(
                "lockTimeoutMinutes must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Truncate an error message to what fits on the job row.
///
/// Cuts on a character boundary so multi-byte input cannot split.
pub fn truncate_error_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        message.to_string()
    } else {
        message.chars().take(max_len).collect()
    }
}

impl ThumbnailJob {
    /// Find a job by id.
    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, model_id, model_version_id, model_hash, status,
                   attempt_count, max_attempts, lock_timeout_minutes,
                   claimed_by, claimed_at, error_message,
                   created_at, updated_at, completed_at
            FROM thumbnail_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find the in-flight job for a model hash, if one exists.
    pub async fn find_active_by_hash(
        model_hash: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, model_id, model_version_id, model_hash, status,
                   attempt_count, max_attempts, lock_timeout_minutes,
                   claimed_by, claimed_at, error_message,
                   created_at, updated_at, completed_at
            FROM thumbnail_jobs
            WHERE model_hash = $1
              AND status NOT IN ('completed', 'dead', 'cancelled')
            LIMIT 1
            "#,
        )
        .bind(model_hash)
        .fetch_optional(pool)
        .await
    }

    /// Insert a new pending job unless an in-flight job already holds the
    /// same hash.
    ///
    /// Returns `None` when the partial unique index on `model_hash` rejected
    /// the insert; the caller re-reads the winning row.
    pub async fn insert_pending(
        request: &EnqueueRequest,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO thumbnail_jobs (
                model_id, model_version_id, model_hash,
                max_attempts, lock_timeout_minutes
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(request.model_id)
        .bind(request.model_version_id)
        .bind(&request.model_hash)
        .bind(request.max_attempts)
        .bind(request.lock_timeout_minutes)
        .fetch_optional(pool)
        .await
    }

    /// Atomically claim the oldest pending job for a worker.
    ///
    /// `FOR UPDATE SKIP LOCKED` keeps concurrent claimers from blocking on or
    /// double-claiming the same row; each job goes to exactly one caller.
    pub async fn claim_next(worker_id: &str, pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM thumbnail_jobs
                WHERE status = 'pending'
                  AND attempt_count < max_attempts
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE thumbnail_jobs
            SET status = 'processing',
                claimed_by = $1,
                claimed_at = NOW(),
                attempt_count = attempt_count + 1,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_job)
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(worker_id)
        .fetch_optional(pool)
        .await
    }

    /// Transition a processing job to completed and release the lease.
    ///
    /// The predicate checks status only, never lease freshness: a worker whose
    /// lease expired can still report success as long as the sweeper has not
    /// reclaimed the row. Returns `None` if the job was not in processing.
    pub async fn complete(job_id: i64, pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_jobs
            SET status = 'completed',
                completed_at = NOW(),
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(job_id)
        .fetch_optional(pool)
        .await
    }

    /// Record a failure and decide retry vs dead-letter from the current row.
    ///
    /// Attempts remaining: back to pending with the lease cleared. Attempts
    /// exhausted: dead. Terminal rows are left untouched (`None`).
    pub async fn fail(
        job_id: i64,
        error_message: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_jobs
            SET status = CASE
                    WHEN attempt_count >= max_attempts THEN 'dead'::thumbnail_job_status
                    ELSE 'pending'::thumbnail_job_status
                END,
                error_message = $2,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('completed', 'dead', 'cancelled')
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .fetch_optional(pool)
        .await
    }

    /// Admin override: put any job back to pending with a fresh attempt
    /// budget. Lease and error state are cleared; `max_attempts` survives.
    pub async fn reset(job_id: i64, pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_jobs
            SET status = 'pending',
                attempt_count = 0,
                claimed_by = NULL,
                claimed_at = NULL,
                error_message = NULL,
                completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(job_id)
        .fetch_optional(pool)
        .await
    }

    /// Cancel every non-terminal job for a model. Returns the cancelled rows.
    pub async fn cancel_active_for_model(
        model_id: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_jobs
            SET status = 'cancelled',
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE model_id = $1
              AND status NOT IN ('completed', 'dead', 'cancelled')
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(model_id)
        .fetch_all(pool)
        .await
    }

    /// Reclaim processing jobs whose lease has expired.
    ///
    /// The expired claim stays counted as a consumed attempt. A job swept on
    /// its final attempt dead-letters directly; leaving it pending would make
    /// it unclaimable forever.
    pub async fn sweep_expired(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_jobs
            SET status = CASE
                    WHEN attempt_count >= max_attempts THEN 'dead'::thumbnail_job_status
                    ELSE 'pending'::thumbnail_job_status
                END,
                error_message = CASE
                    WHEN attempt_count >= max_attempts THEN 'lease expired on final attempt'
                    ELSE error_message
                END,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE status = 'processing'
              AND claimed_at + make_interval(mins => lock_timeout_minutes) < NOW()
            RETURNING id, model_id, model_version_id, model_hash, status,
                      attempt_count, max_attempts, lock_timeout_minutes,
                      claimed_by, claimed_at, error_message,
                      created_at, updated_at, completed_at
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// The most recently created job for a model, regardless of status.
    pub async fn find_latest_for_model(
        model_id: i64,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, model_id, model_version_id, model_hash, status,
                   attempt_count, max_attempts, lock_timeout_minutes,
                   claimed_by, claimed_at, error_message,
                   created_at, updated_at, completed_at
            FROM thumbnail_jobs
            WHERE model_id = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }

    /// List jobs newest first, optionally filtered by status.
    pub async fn list(
        status: Option<JobStatus>,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, Self>(
                    r#"
                    SELECT id, model_id, model_version_id, model_hash, status,
                           attempt_count, max_attempts, lock_timeout_minutes,
                           claimed_by, claimed_at, error_message,
                           created_at, updated_at, completed_at
                    FROM thumbnail_jobs
                    WHERE status = $1
                    ORDER BY id DESC
                    LIMIT $2
                    "#,
                )
                .bind(status)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Self>(
                    r#"
                    SELECT id, model_id, model_version_id, model_hash, status,
                           attempt_count, max_attempts, lock_timeout_minutes,
                           claimed_by, claimed_at, error_message,
                           created_at, updated_at, completed_at
                    FROM thumbnail_jobs
                    ORDER BY id DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(pool)
                .await
            }
        }
    }
}
