//! The worker loop.
//!
//! Poll, claim, render, report, repeat. One job at a time; a bad job is
//! reported and polling continues. A failed report is swallowed on
//! purpose: the lease expires and the queue hands the job out again, so
//! re-rendering identical content must always be acceptable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{CompletedArtifact, ControlPlane, JobPayload};
use crate::blob::BlobClient;
use crate::config::WorkerConfig;
use crate::render::{RenderOptions, ThumbnailRenderer};

/// Longest failure message worth shipping back to the queue.
const MAX_ERROR_MESSAGE_LEN: usize = 2000;

/// Anything smaller than this is a corrupt or blank frame.
const MIN_FRAME_BYTES: usize = 64;

/// Backoff after a dequeue or transport error.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Queue was empty.
    Idle,
    Completed(i64),
    Failed(i64),
}

pub struct WorkerRuntime {
    api: Arc<dyn ControlPlane>,
    blobs: Arc<dyn BlobClient>,
    renderer: Arc<dyn ThumbnailRenderer>,
    config: WorkerConfig,
}

impl WorkerRuntime {
    pub fn new(
        api: Arc<dyn ControlPlane>,
        blobs: Arc<dyn BlobClient>,
        renderer: Arc<dyn ThumbnailRenderer>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            api,
            blobs,
            renderer,
            config,
        }
    }

    /// Run until shutdown is requested.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            worker_id = %self.config.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "render worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.poll_once(&shutdown).await {
                Ok(PollOutcome::Idle) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                // Something was claimed; the queue may hold more.
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "poll failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "render worker stopped");
    }

    /// One poll cycle: claim a job if there is one and see it through.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let Some(job) = self.api.dequeue(&self.config.worker_id).await? else {
            debug!("queue empty");
            return Ok(PollOutcome::Idle);
        };

        info!(
            job_id = job.id,
            model_version_id = job.model_version_id,
            attempt = job.attempt_count,
            "processing job"
        );

        let result = self.process(&job, cancel).await;

        // Scene teardown runs on every path; models left staged here would
        // show up in the next job's frames.
        self.renderer.clear().await;

        match result {
            Ok(artifact) => {
                if let Err(e) = self.api.complete(job.id, &artifact).await {
                    // Swallowed: the lease expires and another worker
                    // re-renders the same content.
                    warn!(job_id = job.id, error = %e, "failed to report completion");
                } else {
                    info!(job_id = job.id, file_ref = %artifact.file_ref, "job completed");
                }
                Ok(PollOutcome::Completed(job.id))
            }
            Err(e) => {
                let message = truncate_message(&format!("{e:#}"), MAX_ERROR_MESSAGE_LEN);
                warn!(job_id = job.id, error = %message, "job failed");
                if let Err(report_err) = self.api.fail(job.id, &message).await {
                    warn!(job_id = job.id, error = %report_err, "failed to report failure");
                }
                Ok(PollOutcome::Failed(job.id))
            }
        }
    }

    /// Download, verify, render, upload. Checked for cancellation between
    /// phases; rendering is the long one.
    async fn process(
        &self,
        job: &JobPayload,
        cancel: &CancellationToken,
    ) -> Result<CompletedArtifact> {
        ensure_not_cancelled(cancel)?;
        let source = self
            .blobs
            .download_source(job.model_version_id)
            .await?
            .with_context(|| {
                format!("no source stored for model version {}", job.model_version_id)
            })?;

        // The job fingerprints the exact bytes it was enqueued for.
        let digest = sha256_hex(&source);
        if digest != job.model_hash {
            bail!(
                "source bytes hash {digest} but the job was enqueued for {}",
                job.model_hash
            );
        }

        ensure_not_cancelled(cancel)?;
        self.renderer
            .load(&source)
            .await
            .context("renderer failed to load model")?;

        let options = RenderOptions {
            width: self.config.render_width,
            height: self.config.render_height,
        };

        ensure_not_cancelled(cancel)?;
        let frame = self
            .renderer
            .render_frame(&options, 0.0)
            .await
            .context("render failed")?;
        if frame.bytes.len() < MIN_FRAME_BYTES {
            bail!("rendered frame too small ({} bytes)", frame.bytes.len());
        }

        // Optional orbit frames ride along; only the still frame lands on
        // the record.
        for i in 0..self.config.orbit_frames {
            ensure_not_cancelled(cancel)?;
            let yaw = 360.0 * i as f32 / self.config.orbit_frames as f32;
            let orbit = self
                .renderer
                .render_frame(&options, yaw)
                .await
                .with_context(|| format!("orbit frame {i} failed"))?;
            if orbit.bytes.len() >= MIN_FRAME_BYTES {
                self.blobs.upload_artifact(orbit.bytes).await?;
            }
        }

        ensure_not_cancelled(cancel)?;
        let size_bytes = frame.bytes.len() as i64;
        let width = frame.width as i32;
        let height = frame.height as i32;
        let file_ref = self
            .blobs
            .upload_artifact(frame.bytes)
            .await
            .context("artifact upload failed")?;

        Ok(CompletedArtifact {
            file_ref,
            size_bytes,
            width,
            height,
        })
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        bail!("cancelled");
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        message.to_string()
    } else {
        message.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(3000);
        assert_eq!(truncate_message(&long, 2000).chars().count(), 2000);
        assert_eq!(truncate_message("short", 2000), "short");
    }
}
