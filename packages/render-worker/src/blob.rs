//! Blob store client.
//!
//! Sources come down by version id; artifacts go up content-addressed, so
//! re-uploading the same frame after a retry is harmless.

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;

#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Source bytes for a model version; `None` when nothing is stored.
    async fn download_source(&self, model_version_id: i64) -> Result<Option<Bytes>>;

    /// Upload a rendered frame; returns its opaque reference.
    async fn upload_artifact(&self, bytes: Bytes) -> Result<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobUploadResponse {
    file_ref: String,
}

/// HTTP implementation against the queue server's blob surface.
pub struct HttpBlobClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBlobClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl BlobClient for HttpBlobClient {
    async fn download_source(&self, model_version_id: i64) -> Result<Option<Bytes>> {
        let response = self
            .client
            .get(format!(
                "{}/model-versions/{model_version_id}/file",
                self.base_url
            ))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => bail!("source download returned {status}"),
        }
    }

    async fn upload_artifact(&self, bytes: Bytes) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/blobs", self.base_url))
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("artifact upload returned {}", response.status());
        }

        let body: BlobUploadResponse = response.json().await?;
        Ok(body.file_ref)
    }
}
