use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Root directory for the filesystem blob store.
    pub blob_dir: String,
    /// "stream" pushes events over SSE; "noop" leaves clients polling.
    pub notifier: NotifierKind,
    /// Cadence of the lease sweeper.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Stream,
    Noop,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let notifier = match env::var("NOTIFIER")
            .unwrap_or_else(|_| "stream".to_string())
            .as_str()
        {
            "stream" => NotifierKind::Stream,
            "noop" => NotifierKind::Noop,
            other => anyhow::bail!("NOTIFIER must be \"stream\" or \"noop\", got {other:?}"),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            blob_dir: env::var("BLOB_DIR").unwrap_or_else(|_| "./data/blobs".to_string()),
            notifier,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("SWEEP_INTERVAL_SECS must be a valid number")?,
        })
    }
}
