//! Queue control-plane client.
//!
//! The worker-facing contract is three calls: claim the next job, report
//! success with the artifact, report failure with a message.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Job shape on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: i64,
    pub model_id: i64,
    pub model_version_id: i64,
    pub model_hash: String,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Artifact fields reported on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedArtifact {
    pub file_ref: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Claim the next pending job, or `None` when the queue is empty.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<JobPayload>>;

    async fn complete(&self, job_id: i64, artifact: &CompletedArtifact) -> Result<()>;

    async fn fail(&self, job_id: i64, error_message: &str) -> Result<()>;
}

/// HTTP implementation against the queue server.
pub struct HttpControlPlane {
    base_url: String,
    client: reqwest::Client,
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn dequeue(&self, worker_id: &str) -> Result<Option<JobPayload>> {
        let response = self
            .client
            .post(format!("{}/thumbnail-jobs/dequeue", self.base_url))
            .json(&serde_json::json!({ "workerId": worker_id }))
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => bail!("dequeue returned {status}"),
        }
    }

    async fn complete(&self, job_id: i64, artifact: &CompletedArtifact) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/thumbnail-jobs/{job_id}/complete",
                self.base_url
            ))
            .json(artifact)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("complete returned {}", response.status());
        }
        Ok(())
    }

    async fn fail(&self, job_id: i64, error_message: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/thumbnail-jobs/{job_id}/fail", self.base_url))
            .json(&serde_json::json!({ "errorMessage": error_message }))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("fail returned {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_payload_parses_the_wire_format() {
        let json = r#"{
            "id": 7,
            "modelId": 42,
            "modelVersionId": 9,
            "modelHash": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "status": "Processing",
            "attemptCount": 1,
            "maxAttempts": 3,
            "claimedBy": "w1",
            "claimedAt": "2025-06-01T12:00:00Z",
            "createdAt": "2025-06-01T11:59:00Z",
            "updatedAt": "2025-06-01T12:00:00Z"
        }"#;

        let job: JobPayload = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, 7);
        assert_eq!(job.model_version_id, 9);
        assert_eq!(job.status, "Processing");
        assert_eq!(job.claimed_by.as_deref(), Some("w1"));
        assert!(job.error_message.is_none());
    }

    #[test]
    fn artifact_serializes_camel_case() {
        let artifact = CompletedArtifact {
            file_ref: "blob/abc".into(),
            size_bytes: 12345,
            width: 256,
            height: 256,
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["fileRef"], "blob/abc");
        assert_eq!(json["sizeBytes"], 12345);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpControlPlane::new("http://localhost:8080/").unwrap();
        assert_eq!(api.base_url, "http://localhost:8080");
    }
}
