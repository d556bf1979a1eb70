//! Block watcher: runs one cycle per newly observed block.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::MonitorCycle;
use crate::error::{Error, Result};
use crate::model::BlockNumber;

/// Polls the chain head on a fixed interval and runs a cycle whenever it
/// has moved. Cycles run one at a time, so a scope never has two writers.
/// Blocks skipped between polls are not backfilled.
pub struct Watcher {
    cycle: Arc<MonitorCycle>,
    threshold: u64,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Clone for Watcher {
    fn clone(&self) -> Self {
        Self {
            cycle: Arc::clone(&self.cycle),
            threshold: self.threshold,
            interval: self.interval,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Watcher {
    pub fn new(cycle: Arc<MonitorCycle>, threshold: u64, interval: Duration) -> Self {
        Self {
            cycle,
            threshold,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the watcher to stop after the current cycle.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    ///
    /// A failed cycle is logged. See [`tick`](Self::tick) for which heads
    /// are retried.
    pub async fn run(&self) -> Result<()> {
        info!(interval = ?self.interval, threshold = self.threshold, "watching for new blocks");

        let mut last_seen: Option<BlockNumber> = None;
        loop {
            if let Err(e) = self.tick(&mut last_seen).await {
                error!(error = %e, last_seen = ?last_seen, "monitor cycle failed");
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("watcher shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Run a cycle at the chain head if it is past `last_seen`.
    ///
    /// Returns the block that was processed, or `None` when the head has
    /// not moved. `last_seen` advances to the head when the cycle succeeds,
    /// and also when it fails while writing state: some scopes may already
    /// hold this block's increment, so the head is never run twice. Any
    /// other failure leaves `last_seen` alone and the head is retried.
    pub async fn tick(
        &self,
        last_seen: &mut Option<BlockNumber>,
    ) -> Result<Option<BlockNumber>> {
        let head = self.cycle.latest_block().await?;
        if last_seen.is_some_and(|seen| head <= seen) {
            debug!(head, "no new block");
            return Ok(None);
        }

        match self.cycle.run(head, self.threshold).await {
            Ok(report) => {
                debug!(block = head, unworked = report.unworked.len(), "cycle complete");
                *last_seen = Some(head);
                Ok(Some(head))
            }
            Err(e @ Error::StateWrite { .. }) => {
                warn!(block = head, "state partially written, not retrying block");
                *last_seen = Some(head);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
