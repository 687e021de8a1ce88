//! Content-addressed blob storage.
//!
//! Artifacts are stored under their SHA-256, so writing the same bytes twice
//! lands on the same reference and duplicate uploads are harmless. Model
//! source bytes are keyed by version id; ingesting them is the upload
//! pipeline's job, this module only hands them to workers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::common::hash::{is_sha256_hex, sha256_hex};

/// Reference prefix for content-addressed artifacts.
const BLOB_REF_PREFIX: &str = "blob/";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store artifact bytes, returning an opaque `blob/<sha256>` reference.
    async fn put(&self, bytes: Bytes) -> Result<String>;

    /// Fetch artifact bytes by reference.
    async fn get(&self, file_ref: &str) -> Result<Option<Bytes>>;

    /// Store the source bytes for a model version.
    async fn put_model_source(&self, model_version_id: i64, bytes: Bytes) -> Result<()>;

    /// Fetch the source bytes for a model version.
    async fn get_model_source(&self, model_version_id: i64) -> Result<Option<Bytes>>;
}

/// Split a `blob/<sha256>` reference into its validated hash part.
fn parse_blob_ref(file_ref: &str) -> Result<&str> {
    let hash = file_ref
        .strip_prefix(BLOB_REF_PREFIX)
        .with_context(|| format!("malformed blob reference: {file_ref}"))?;
    if !is_sha256_hex(hash) {
        anyhow::bail!("malformed blob reference: {file_ref}");
    }
    Ok(hash)
}

/// Filesystem-backed blob store.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join("blobs").join(hash)
    }

    fn source_path(&self, model_version_id: i64) -> PathBuf {
        self.root.join("sources").join(format!("{model_version_id}.bin"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<String> {
        let hash = sha256_hex(&bytes);
        let path = self.blob_path(&hash);

        tokio::fs::create_dir_all(self.root.join("blobs"))
            .await
            .context("failed to create blob directory")?;

        // Same hash means same bytes; an existing file needs no rewrite.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(format!("{BLOB_REF_PREFIX}{hash}"));
        }

        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write blob {hash}"))?;
        Ok(format!("{BLOB_REF_PREFIX}{hash}"))
    }

    async fn get(&self, file_ref: &str) -> Result<Option<Bytes>> {
        let hash = parse_blob_ref(file_ref)?;
        match tokio::fs::read(self.blob_path(hash)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read blob {hash}")),
        }
    }

    async fn put_model_source(&self, model_version_id: i64, bytes: Bytes) -> Result<()> {
        let path = self.source_path(model_version_id);
        tokio::fs::create_dir_all(self.root.join("sources"))
            .await
            .context("failed to create source directory")?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write source for version {model_version_id}"))?;
        Ok(())
    }

    async fn get_model_source(&self, model_version_id: i64) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.source_path(model_version_id)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read source for version {model_version_id}"))
            }
        }
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    sources: Mutex<HashMap<i64, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<String> {
        let hash = sha256_hex(&bytes);
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hash.clone(), bytes);
        Ok(format!("{BLOB_REF_PREFIX}{hash}"))
    }

    async fn get(&self, file_ref: &str) -> Result<Option<Bytes>> {
        let hash = parse_blob_ref(file_ref)?;
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .cloned())
    }

    async fn put_model_source(&self, model_version_id: i64, bytes: Bytes) -> Result<()> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model_version_id, bytes);
        Ok(())
    }

    async fn get_model_source(&self, model_version_id: i64) -> Result<Option<Bytes>> {
        Ok(self
            .sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&model_version_id)
            .cloned())
    }
}
