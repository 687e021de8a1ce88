// Main entry point for the asset library API server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use server_core::domains::thumbnails::{PostgresRecordStore, ThumbnailRecordService};
use server_core::kernel::blobs::FsBlobStore;
use server_core::kernel::jobs::{LeaseSweeper, PostgresJobStore, ThumbnailQueue};
use server_core::kernel::notifications::{NoopNotifier, StreamHubNotifier, ThumbnailNotifier};
use server_core::kernel::stream_hub::StreamHub;
use server_core::server::{build_app, AppState};
use server_core::{Config, NotifierKind};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting asset library API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire the thumbnail pipeline
    let stream_hub = StreamHub::new();
    let notifier: Arc<dyn ThumbnailNotifier> = match config.notifier {
        NotifierKind::Stream => Arc::new(StreamHubNotifier::new(stream_hub.clone())),
        NotifierKind::Noop => Arc::new(NoopNotifier),
    };
    let records = Arc::new(ThumbnailRecordService::new(Arc::new(
        PostgresRecordStore::new(pool.clone()),
    )));
    let queue = Arc::new(ThumbnailQueue::new(
        Arc::new(PostgresJobStore::new(pool.clone())),
        records.clone(),
        notifier,
    ));

    // Recover leases dropped by vanished workers
    let shutdown = CancellationToken::new();
    let sweeper = LeaseSweeper::new(
        queue.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.child_token()));

    // Build application
    let state = AppState::new(
        queue,
        records,
        Arc::new(FsBlobStore::new(&config.blob_dir)),
        stream_hub,
        Some(pool),
    );
    let app = build_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    let _ = sweeper_handle.await;
    tracing::info!("shutdown complete");

    Ok(())
}
