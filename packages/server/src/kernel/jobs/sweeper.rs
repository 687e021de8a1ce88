//! Periodic lease sweeper.
//!
//! Workers that die mid-job never report back; their claims expire and this
//! task returns the rows to pending so another worker can pick them up. The
//! consumed attempt stays counted.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::queue::ThumbnailQueue;

pub struct LeaseSweeper {
    queue: Arc<ThumbnailQueue>,
    interval: Duration,
}

impl LeaseSweeper {
    pub fn new(queue: Arc<ThumbnailQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Run until shutdown is requested.
    ///
    /// A failing sweep is logged and retried on the next tick; the sweeper
    /// itself never dies before shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "lease sweeper starting");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.queue.sweep_once().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "recovered expired job leases"),
                        Err(e) => error!(error = %e, "lease sweep failed"),
                    }
                }
            }
        }

        info!("lease sweeper stopped");
    }
}
