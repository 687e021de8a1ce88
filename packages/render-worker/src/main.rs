// Main entry point for the render worker

use std::sync::Arc;

use anyhow::{Context, Result};
use render_worker::api::HttpControlPlane;
use render_worker::blob::HttpBlobClient;
use render_worker::config::WorkerConfig;
use render_worker::render::CommandRenderer;
use render_worker::runtime::WorkerRuntime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,render_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = WorkerConfig::from_env().context("Failed to load configuration")?;
    let renderer_cmd = config
        .renderer_cmd
        .clone()
        .context("RENDERER_CMD must be set")?;

    tracing::info!(
        worker_id = %config.worker_id,
        api_base_url = %config.api_base_url,
        "starting render worker"
    );

    let runtime = WorkerRuntime::new(
        Arc::new(HttpControlPlane::new(&config.api_base_url)?),
        Arc::new(HttpBlobClient::new(&config.api_base_url)?),
        Arc::new(CommandRenderer::new(renderer_cmd)),
        config,
    );

    // Stops polling and abandons any in-flight render at the next phase
    // boundary; the queue re-runs it after the lease expires.
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        signal_shutdown.cancel();
    });

    runtime.run(shutdown).await;
    Ok(())
}
