//! Mock collaborators for runtime tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::api::{CompletedArtifact, ControlPlane, JobPayload};
use crate::blob::BlobClient;
use crate::render::{RenderOptions, RenderedFrame, ThumbnailRenderer};

/// Build a claimed job the way the control plane would hand it out.
pub fn claimed_job(id: i64, model_id: i64, model_version_id: i64, model_hash: &str) -> JobPayload {
    let now = Utc::now();
    JobPayload {
        id,
        model_id,
        model_version_id,
        model_hash: model_hash.to_string(),
        status: "Processing".to_string(),
        attempt_count: 1,
        max_attempts: 3,
        claimed_by: Some("w1".to_string()),
        claimed_at: Some(now),
        created_at: now,
        updated_at: now,
        error_message: None,
    }
}

/// Control plane double: hands out queued jobs and records reports.
#[derive(Default)]
pub struct MockControlPlane {
    queue: Mutex<VecDeque<JobPayload>>,
    completions: Mutex<Vec<(i64, CompletedArtifact)>>,
    failures: Mutex<Vec<(i64, String)>>,
    report_errors: AtomicBool,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_job(&self, job: JobPayload) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(job);
    }

    /// Make `complete` and `fail` return transport errors.
    pub fn set_report_errors(&self, enabled: bool) {
        self.report_errors.store(enabled, Ordering::SeqCst);
    }

    pub fn completions(&self) -> Vec<(i64, CompletedArtifact)> {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn failures(&self) -> Vec<(i64, String)> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn dequeue(&self, _worker_id: &str) -> Result<Option<JobPayload>> {
        Ok(self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front())
    }

    async fn complete(&self, job_id: i64, artifact: &CompletedArtifact) -> Result<()> {
        if self.report_errors.load(Ordering::SeqCst) {
            bail!("control plane unreachable");
        }
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((job_id, artifact.clone()));
        Ok(())
    }

    async fn fail(&self, job_id: i64, error_message: &str) -> Result<()> {
        if self.report_errors.load(Ordering::SeqCst) {
            bail!("control plane unreachable");
        }
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((job_id, error_message.to_string()));
        Ok(())
    }
}

/// Blob double: preloaded sources, recorded uploads.
#[derive(Default)]
pub struct MockBlobClient {
    sources: Mutex<HashMap<i64, Bytes>>,
    uploads: Mutex<Vec<Bytes>>,
}

impl MockBlobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_source(&self, model_version_id: i64, bytes: impl Into<Bytes>) {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model_version_id, bytes.into());
    }

    pub fn uploads(&self) -> Vec<Bytes> {
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl BlobClient for MockBlobClient {
    async fn download_source(&self, model_version_id: i64) -> Result<Option<Bytes>> {
        Ok(self
            .sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&model_version_id)
            .cloned())
    }

    async fn upload_artifact(&self, bytes: Bytes) -> Result<String> {
        let mut uploads = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        uploads.push(bytes);
        Ok(format!("blob/mock-{}", uploads.len()))
    }
}

/// Renderer double that tracks scene hygiene.
///
/// `staged` counts models currently in the scene; `max_staged` records the
/// worst case ever observed. If teardown is skipped between jobs the next
/// `load` pushes `max_staged` past 1.
pub struct MockRenderer {
    staged: AtomicUsize,
    max_staged: AtomicUsize,
    loads: AtomicUsize,
    clears: AtomicUsize,
    fail_render: AtomicBool,
    frame: Mutex<Bytes>,
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self {
            staged: AtomicUsize::new(0),
            max_staged: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            fail_render: AtomicBool::new(false),
            frame: Mutex::new(Bytes::from(vec![0u8; 128])),
        }
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_render(&self, enabled: bool) {
        self.fail_render.store(enabled, Ordering::SeqCst);
    }

    pub fn set_frame(&self, bytes: impl Into<Bytes>) {
        *self.frame.lock().unwrap_or_else(|e| e.into_inner()) = bytes.into();
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn max_staged(&self) -> usize {
        self.max_staged.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThumbnailRenderer for MockRenderer {
    async fn load(&self, _model: &[u8]) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let staged = self.staged.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_staged.fetch_max(staged, Ordering::SeqCst);
        Ok(())
    }

    async fn render_frame(
        &self,
        options: &RenderOptions,
        _yaw_degrees: f32,
    ) -> Result<RenderedFrame> {
        if self.fail_render.load(Ordering::SeqCst) {
            bail!("renderer crashed");
        }
        Ok(RenderedFrame {
            bytes: self.frame.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            width: options.width,
            height: options.height,
        })
    }

    async fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.staged.store(0, Ordering::SeqCst);
    }
}
