//! Thumbnail record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::kernel::jobs::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "thumbnail_record_status", rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

/// Artifact fields reported by a worker on successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub file_ref: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
}

impl ArtifactMeta {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.file_ref.is_empty() {
            return Err(QueueError::Validation("fileRef must not be empty".into()));
        }
        if self.size_bytes <= 0 {
            return Err(QueueError::Validation("sizeBytes must be positive".into()));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(QueueError::Validation(
                "width and height must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// One row per model version. Updated in place, never duplicated; a version
/// re-enters pending when regeneration is requested.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    pub model_version_id: i64,
    pub model_id: i64,
    pub status: RecordStatus,

    // Artifact, populated only in ready
    pub file_ref: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,

    // Populated only in failed
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ThumbnailRecord {
    pub async fn find(
        model_version_id: i64,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT model_version_id, model_id, status, file_ref, width, height,
                   size_bytes, error_message, created_at, processed_at
            FROM thumbnail_records
            WHERE model_version_id = $1
            "#,
        )
        .bind(model_version_id)
        .fetch_optional(pool)
        .await
    }

    /// Newest record for a model, by version id.
    pub async fn find_latest_for_model(
        model_id: i64,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT model_version_id, model_id, status, file_ref, width, height,
                   size_bytes, error_message, created_at, processed_at
            FROM thumbnail_records
            WHERE model_id = $1
            ORDER BY model_version_id DESC
            LIMIT 1
            "#,
        )
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }

    /// Create the pending row if the version has never been observed.
    /// An existing row keeps its state.
    pub async fn ensure_pending(
        model_version_id: i64,
        model_id: i64,
        pool: &PgPool,
    ) -> Result<Self, sqlx::Error> {
        if let Some(inserted) = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO thumbnail_records (model_version_id, model_id)
            VALUES ($1, $2)
            ON CONFLICT (model_version_id) DO NOTHING
            RETURNING model_version_id, model_id, status, file_ref, width, height,
                      size_bytes, error_message, created_at, processed_at
            "#,
        )
        .bind(model_version_id)
        .bind(model_id)
        .fetch_optional(pool)
        .await?
        {
            return Ok(inserted);
        }

        sqlx::query_as::<_, Self>(
            r#"
            SELECT model_version_id, model_id, status, file_ref, width, height,
                   size_bytes, error_message, created_at, processed_at
            FROM thumbnail_records
            WHERE model_version_id = $1
            "#,
        )
        .bind(model_version_id)
        .fetch_one(pool)
        .await
    }

    /// Pending/failed -> processing. Returns `None` when the row was already
    /// past that point (a retry attempt on a version still marked processing).
    pub async fn mark_processing(
        model_version_id: i64,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_records
            SET status = 'processing'
            WHERE model_version_id = $1
              AND status IN ('pending', 'failed')
            RETURNING model_version_id, model_id, status, file_ref, width, height,
                      size_bytes, error_message, created_at, processed_at
            "#,
        )
        .bind(model_version_id)
        .fetch_optional(pool)
        .await
    }

    /// Upsert the ready state with its artifact fields.
    pub async fn mark_ready(
        model_version_id: i64,
        model_id: i64,
        artifact: &ArtifactMeta,
        pool: &PgPool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO thumbnail_records (
                model_version_id, model_id, status, file_ref, width, height,
                size_bytes, processed_at
            )
            VALUES ($1, $2, 'ready', $3, $4, $5, $6, NOW())
            ON CONFLICT (model_version_id) DO UPDATE SET
                status = 'ready',
                file_ref = EXCLUDED.file_ref,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                size_bytes = EXCLUDED.size_bytes,
                error_message = NULL,
                processed_at = NOW()
            RETURNING model_version_id, model_id, status, file_ref, width, height,
                      size_bytes, error_message, created_at, processed_at
            "#,
        )
        .bind(model_version_id)
        .bind(model_id)
        .bind(&artifact.file_ref)
        .bind(artifact.width)
        .bind(artifact.height)
        .bind(artifact.size_bytes)
        .fetch_one(pool)
        .await
    }

    /// Upsert the failed state. Only called once a job is beyond retry.
    pub async fn mark_failed(
        model_version_id: i64,
        model_id: i64,
        error_message: &str,
        pool: &PgPool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO thumbnail_records (
                model_version_id, model_id, status, error_message, processed_at
            )
            VALUES ($1, $2, 'failed', $3, NOW())
            ON CONFLICT (model_version_id) DO UPDATE SET
                status = 'failed',
                file_ref = NULL,
                width = NULL,
                height = NULL,
                size_bytes = NULL,
                error_message = EXCLUDED.error_message,
                processed_at = NOW()
            RETURNING model_version_id, model_id, status, file_ref, width, height,
                      size_bytes, error_message, created_at, processed_at
            "#,
        )
        .bind(model_version_id)
        .bind(model_id)
        .bind(error_message)
        .fetch_one(pool)
        .await
    }

    /// Reset an existing row to pending for regeneration.
    pub async fn reset_pending(
        model_version_id: i64,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE thumbnail_records
            SET status = 'pending',
                file_ref = NULL,
                width = NULL,
                height = NULL,
                size_bytes = NULL,
                error_message = NULL,
                processed_at = NULL
            WHERE model_version_id = $1
            RETURNING model_version_id, model_id, status, file_ref, width, height,
                      size_bytes, error_message, created_at, processed_at
            "#,
        )
        .bind(model_version_id)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact() -> ArtifactMeta {
        ArtifactMeta {
            file_ref: "blob/abc".into(),
            size_bytes: 12345,
            width: 256,
            height: 256,
        }
    }

    #[test]
    fn valid_artifact_passes() {
        assert!(sample_artifact().validate().is_ok());
    }

    #[test]
    fn rejects_empty_file_ref() {
        let mut artifact = sample_artifact();
        artifact.file_ref = String::new();
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let mut artifact = sample_artifact();
        artifact.width = 0;
        assert!(artifact.validate().is_err());

        let mut artifact = sample_artifact();
        artifact.height = -1;
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn rejects_zero_size() {
        let mut artifact = sample_artifact();
        artifact.size_bytes = 0;
        assert!(artifact.validate().is_err());
    }
}
