use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::error::Result;

use super::StatusHistory;

/// Periodically evicts history older than the retention horizon.
pub struct GarbageCollector {
    history: Arc<dyn StatusHistory>,
    retention: chrono::Duration,
    interval: Duration,
}

impl GarbageCollector {
    pub fn new(history: Arc<dyn StatusHistory>, retention: chrono::Duration, interval: Duration) -> Self {
        Self {
            history,
            retention,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        if !self.history.evicts_by_age() {
            info!("history backend bounds itself, garbage collector not needed");
            return;
        }

        let mut interval = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.collect().await;
                }
                _ = shutdown.changed() => {
                    info!("garbage collector shutting down");
                    return;
                }
            }
        }
    }

    /// One eviction pass. Failures are logged and retried on the next tick.
    pub async fn collect(&self) {
        match self.collect_at(Utc::now()).await {
            Ok(0) => debug!("no expired history"),
            Ok(removed) => info!(removed, "evicted expired history"),
            Err(e) => warn!(error = %e, "history eviction failed"),
        }
    }

    pub async fn collect_at(&self, now: DateTime<Utc>) -> Result<u64> {
        self.history.remove_entries_before(now - self.retention).await
    }
}
