//! HTTP error mapping.
//!
//! Queue operations return structured errors; this translates them at the
//! boundary. Validation maps to 4xx and is never worth retrying; storage
//! failures map to 5xx and are.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::kernel::jobs::QueueError;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match &err {
            QueueError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, message.clone())
            }
            QueueError::JobNotFound(_)
            | QueueError::RecordNotFound(_)
            | QueueError::ModelNotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            QueueError::Storage(_) => {
                error!(error = %err, "storage failure serving request");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage temporarily unavailable",
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "internal error serving request");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = ApiError::from(QueueError::Validation("bad hash".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_job_maps_to_404() {
        let err = ApiError::from(QueueError::JobNotFound(7));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
