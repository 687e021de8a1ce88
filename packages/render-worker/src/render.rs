//! Renderer seam.
//!
//! Rendering itself is a separate headless program; the worker only drives
//! it through this trait. The scene is stateful: `load` stages a model,
//! `render_frame` draws it, and `clear` tears the scene down. The runtime
//! clears after every job, success or not, because a scene that keeps
//! models across jobs draws them into every later thumbnail.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Stage model bytes into the scene.
    async fn load(&self, model: &[u8]) -> Result<()>;

    /// Draw one frame of the staged scene at the given camera yaw.
    async fn render_frame(&self, options: &RenderOptions, yaw_degrees: f32)
        -> Result<RenderedFrame>;

    /// Tear the scene down. Safe to call with nothing staged.
    async fn clear(&self);
}

/// Drives an external headless renderer:
///
/// ```text
/// <command> <model-path> <output-path> <width> <height> <yaw-degrees>
/// ```
///
/// The command writes an encoded frame to the output path and exits zero.
pub struct CommandRenderer {
    command: String,
    scene: Mutex<Option<PathBuf>>,
}

impl CommandRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            scene: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ThumbnailRenderer for CommandRenderer {
    async fn load(&self, model: &[u8]) -> Result<()> {
        let path = std::env::temp_dir().join(format!("render-scene-{}.bin", Uuid::new_v4()));
        tokio::fs::write(&path, model)
            .await
            .context("failed to stage model for rendering")?;

        let mut scene = self.scene.lock().await;
        // A model staged earlier in this job slot is stale.
        if let Some(old) = scene.take() {
            let _ = tokio::fs::remove_file(old).await;
        }
        *scene = Some(path);
        Ok(())
    }

    async fn render_frame(
        &self,
        options: &RenderOptions,
        yaw_degrees: f32,
    ) -> Result<RenderedFrame> {
        let model_path = self
            .scene
            .lock()
            .await
            .clone()
            .context("no model staged in the scene")?;

        let output_path =
            std::env::temp_dir().join(format!("render-frame-{}.png", Uuid::new_v4()));

        let output = tokio::process::Command::new(&self.command)
            .arg(&model_path)
            .arg(&output_path)
            .arg(options.width.to_string())
            .arg(options.height.to_string())
            .arg(yaw_degrees.to_string())
            .output()
            .await
            .with_context(|| format!("failed to run renderer command {:?}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("renderer exited with {}: {}", output.status, stderr.trim());
        }

        let bytes = tokio::fs::read(&output_path)
            .await
            .context("renderer produced no output file")?;
        let _ = tokio::fs::remove_file(&output_path).await;

        if bytes.is_empty() {
            bail!("renderer returned no frame");
        }

        Ok(RenderedFrame {
            bytes: Bytes::from(bytes),
            width: options.width,
            height: options.height,
        })
    }

    async fn clear(&self) {
        if let Some(path) = self.scene.lock().await.take() {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}
