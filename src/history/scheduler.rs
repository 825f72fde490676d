use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{self, Duration};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::providers::ClusterListProvider;
use crate::snapshot::fetcher::SnapshotFetcher;

use super::StatusHistory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub saved: usize,
    pub failed: usize,
}

/// Takes a snapshot of every configured cluster on a fixed cadence and
/// stores it.
pub struct SnapshotScheduler {
    provider: Arc<dyn ClusterListProvider>,
    fetcher: Arc<SnapshotFetcher>,
    history: Arc<dyn StatusHistory>,
    interval: Duration,
}

impl SnapshotScheduler {
    pub fn new(
        provider: Arc<dyn ClusterListProvider>,
        fetcher: Arc<SnapshotFetcher>,
        history: Arc<dyn StatusHistory>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            fetcher,
            history,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        let mut interval = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) => info!(saved = report.saved, failed = report.failed, "snapshot tick done"),
                        Err(e) => error!(error = %e, "cannot list clusters"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("snapshot scheduler shutting down");
                    return;
                }
            }
        }
    }

    /// Snapshot and save every cluster concurrently. Only failing to list
    /// the clusters fails the tick; per-cluster failures are counted.
    pub async fn tick(&self) -> Result<TickReport> {
        let clusters = self.provider.clusters().await?;

        let identifiers: Vec<String> = clusters.iter().map(|c| c.identifier.clone()).collect();
        let handles: Vec<_> = clusters
            .into_iter()
            .map(|cluster| {
                let fetcher = self.fetcher.clone();
                let history = self.history.clone();
                tokio::spawn(async move {
                    let snapshot = fetcher.fetch_cluster(&cluster).await?;
                    history
                        .save(&cluster.identifier, Utc::now(), &snapshot)
                        .await
                })
            })
            .collect();

        let mut report = TickReport::default();
        for (cluster, result) in identifiers.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(Ok(id)) => {
                    info!(cluster = %cluster, %id, "snapshot saved");
                    report.saved += 1;
                }
                Ok(Err(e)) => {
                    warn!(cluster = %cluster, error = %e, "snapshot failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(cluster = %cluster, error = %e, "snapshot task panicked");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ring::RingBufferHistory;
    use crate::providers::in_memory::InMemoryClusterList;
    use crate::testing::{FakeApi, FakeConnector, cluster, node};

    #[tokio::test]
    async fn one_failing_cluster_does_not_block_the_others() {
        let (prod, staging, broken) = (cluster("prod"), cluster("staging"), cluster("broken"));
        let api = || FakeApi {
            nodes: vec![node("node-a", "1", "1Gi", true)],
            ..Default::default()
        };
        let connector = FakeConnector::default()
            .with(&prod, api())
            .with(&staging, api())
            .refusing(&broken);

        let history = Arc::new(RingBufferHistory::new(10));
        let scheduler = SnapshotScheduler::new(
            Arc::new(InMemoryClusterList::new(vec![prod, staging, broken]).unwrap()),
            Arc::new(SnapshotFetcher::new(
                Arc::new(connector),
                Duration::from_secs(5),
                Duration::from_secs(10),
            )),
            history.clone(),
            Duration::from_secs(300),
        );

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report, TickReport { saved: 2, failed: 1 });

        let since = Utc::now() - chrono::Duration::minutes(1);
        let until = Utc::now() + chrono::Duration::minutes(1);
        for id in ["prod", "staging"] {
            let entries = history.entries_by_cluster(id, since, until).await.unwrap();
            assert_eq!(entries.len(), 1);
            let snapshot = history.fetch(entries[0].id).await.unwrap();
            assert_eq!(snapshot.nodes.len(), 1);
        }
        assert!(history
            .entries_by_cluster("broken", since, until)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cluster_does_not_hold_back_the_others() {
        let (slow, prod, staging) = (cluster("slow"), cluster("prod"), cluster("staging"));
        let api = |delay| FakeApi {
            nodes: vec![node("node-a", "1", "1Gi", true)],
            delay,
            ..Default::default()
        };
        let connector = FakeConnector::default()
            .with(&slow, api(Some(Duration::from_secs(30))))
            .with(&prod, api(None))
            .with(&staging, api(None));

        let history = Arc::new(RingBufferHistory::new(10));
        let scheduler = Arc::new(SnapshotScheduler::new(
            Arc::new(InMemoryClusterList::new(vec![slow, prod, staging]).unwrap()),
            Arc::new(SnapshotFetcher::new(
                Arc::new(connector),
                Duration::from_secs(40),
                Duration::from_secs(120),
            )),
            history.clone(),
            Duration::from_secs(300),
        ));

        let tick = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.tick().await }
        });
        time::sleep(Duration::from_secs(1)).await;

        let since = Utc::now() - chrono::Duration::minutes(5);
        let until = Utc::now() + chrono::Duration::minutes(5);
        let saved = |id: &'static str| {
            let history = history.clone();
            async move { history.entries_by_cluster(id, since, until).await.unwrap().len() }
        };
        assert!(!tick.is_finished());
        assert_eq!(saved("prod").await, 1);
        assert_eq!(saved("staging").await, 1);
        assert_eq!(saved("slow").await, 0);

        let report = tick.await.unwrap().unwrap();
        assert_eq!(report, TickReport { saved: 3, failed: 0 });
        assert_eq!(saved("slow").await, 1);
    }
}
