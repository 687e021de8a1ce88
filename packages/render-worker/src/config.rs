use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use uuid::Uuid;

/// Polling any faster than this just hammers the control plane.
pub const MIN_POLL_INTERVAL_MS: u64 = 1000;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Where the queue control plane lives.
    pub api_base_url: String,
    /// Unique per process instance; auto-generated unless overridden.
    pub worker_id: String,
    pub poll_interval: Duration,
    pub render_width: u32,
    pub render_height: u32,
    /// Extra frames around the model; 0 renders the still frame only.
    pub orbit_frames: u32,
    /// External headless renderer command.
    pub renderer_cmd: Option<String>,
}

/// Clamp a poll interval to the supported floor.
pub fn clamp_poll_interval_ms(ms: u64) -> u64 {
    ms.max(MIN_POLL_INTERVAL_MS)
}

impl WorkerConfig {
    /// Defaults for everything but the control plane address.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_millis(5000),
            render_width: 256,
            render_height: 256,
            orbit_frames: 0,
            renderer_cmd: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let mut config = Self::new(
            env::var("API_BASE_URL").context("API_BASE_URL must be set")?,
        );

        if let Ok(worker_id) = env::var("WORKER_ID") {
            config.worker_id = worker_id;
        }

        let poll_ms: u64 = env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("POLL_INTERVAL_MS must be a valid number")?;
        config.poll_interval = Duration::from_millis(clamp_poll_interval_ms(poll_ms));

        config.render_width = env::var("RENDER_WIDTH")
            .unwrap_or_else(|_| "256".to_string())
            .parse()
            .context("RENDER_WIDTH must be a valid number")?;
        config.render_height = env::var("RENDER_HEIGHT")
            .unwrap_or_else(|_| "256".to_string())
            .parse()
            .context("RENDER_HEIGHT must be a valid number")?;
        config.orbit_frames = env::var("ORBIT_FRAMES")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .context("ORBIT_FRAMES must be a valid number")?;
        config.renderer_cmd = env::var("RENDERER_CMD").ok();

        Ok(config)
    }
}
