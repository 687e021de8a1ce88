//! Error taxonomy for queue operations.
//!
//! Queue methods return these as structured results instead of letting
//! errors unwind across the HTTP boundary. Validation failures map to 4xx,
//! storage failures to 5xx; callers never retry validation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Caller supplied something malformed or out of range.
    #[error("{0}")]
    Validation(String),

    /// No job with this id.
    #[error("job {0} not found")]
    JobNotFound(i64),

    /// No thumbnail record for this model version.
    #[error("thumbnail record for model version {0} not found")]
    RecordNotFound(i64),

    /// No render history for this model at all.
    #[error("no thumbnail jobs recorded for model {0}")]
    ModelNotFound(i64),

    /// Transient infrastructure failure; safe to retry later.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl QueueError {
    /// Whether the caller can expect a later retry of the same call to
    /// succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Storage(_))
    }
}
