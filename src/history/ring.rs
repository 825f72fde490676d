use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::status::ClusterSnapshot;

use super::{HistoryEntry, StatusHistory};

/// 60 hours of history at one snapshot every 5 minutes.
pub const DEFAULT_CAPACITY: usize = 720;

struct Slot {
    entry: HistoryEntry,
    snapshot: ClusterSnapshot,
}

struct Ring {
    slots: Vec<Option<Slot>>,
    next: usize,
}

/// Fixed-size in-process history. Once full, each save overwrites the oldest
/// slot; age-based removal is a no-op.
pub struct RingBufferHistory {
    ring: RwLock<Ring>,
}

impl RingBufferHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: RwLock::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                next: 0,
            }),
        }
    }
}

impl Ring {
    /// Occupied slots, oldest write first.
    fn iter(&self) -> impl Iterator<Item = &Slot> {
        let (newer, older) = self.slots.split_at(self.next);
        older.iter().chain(newer.iter()).flatten()
    }
}

#[async_trait]
impl StatusHistory for RingBufferHistory {
    async fn save(
        &self,
        cluster_identifier: &str,
        time: DateTime<Utc>,
        snapshot: &ClusterSnapshot,
    ) -> Result<Uuid> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            cluster_identifier: cluster_identifier.to_string(),
            entry_time: time,
        };
        let id = entry.id;

        let mut ring = self.ring.write().await;
        let pos = ring.next;
        if let Some(old) = ring.slots[pos].take() {
            debug!(id = %old.entry.id, "ring buffer full, overwriting oldest entry");
        }
        ring.slots[pos] = Some(Slot {
            entry,
            snapshot: snapshot.clone(),
        });
        ring.next = (pos + 1) % ring.slots.len();
        Ok(id)
    }

    async fn entries_by_cluster(
        &self,
        cluster_identifier: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        let ring = self.ring.read().await;
        let mut entries: Vec<HistoryEntry> = ring
            .iter()
            .map(|s| &s.entry)
            .filter(|e| e.cluster_identifier == cluster_identifier)
            .filter(|e| e.entry_time >= from && e.entry_time <= to)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.entry_time);
        Ok(entries)
    }

    async fn fetch(&self, id: Uuid) -> Result<ClusterSnapshot> {
        let ring = self.ring.read().await;
        ring.iter()
            .find(|s| s.entry.id == id)
            .map(|s| s.snapshot.clone())
            .ok_or_else(|| Error::NotFound(format!("history entry {}", id)))
    }

    async fn remove_entries_before(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }

    fn evicts_by_age(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn snapshot(marker: &str) -> ClusterSnapshot {
        ClusterSnapshot {
            warnings: vec![marker.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_then_fetch() {
        let history = RingBufferHistory::new(4);
        let saved = snapshot("one");
        let id = history.save("prod", at(0), &saved).await.unwrap();
        assert_eq!(history.fetch(id).await.unwrap(), saved);
    }

    #[tokio::test]
    async fn full_buffer_drops_the_oldest() {
        let history = RingBufferHistory::new(3);
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(history.save("prod", at(i), &snapshot("s")).await.unwrap());
        }

        let entries = history
            .entries_by_cluster("prod", at(-60), at(60))
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.id != ids[0]));
        assert_eq!(entries[0].entry_time, at(1));
        assert!(matches!(history.fetch(ids[0]).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_filters_cluster_and_window() {
        let history = RingBufferHistory::new(10);
        for i in 0..5 {
            history.save("prod", at(i), &snapshot("p")).await.unwrap();
            history.save("staging", at(i), &snapshot("s")).await.unwrap();
        }

        let entries = history
            .entries_by_cluster("prod", at(1), at(3))
            .await
            .unwrap();
        let times: Vec<_> = entries.iter().map(|e| e.entry_time).collect();
        assert_eq!(times, [at(1), at(2), at(3)]);
        assert!(entries.iter().all(|e| e.cluster_identifier == "prod"));

        assert!(history
            .entries_by_cluster("unknown", at(0), at(5))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn age_removal_is_a_no_op() {
        let history = RingBufferHistory::new(2);
        history.save("prod", at(0), &snapshot("s")).await.unwrap();
        assert_eq!(history.remove_entries_before(at(10)).await.unwrap(), 0);
        assert_eq!(
            history.entries_by_cluster("prod", at(0), at(0)).await.unwrap().len(),
            1
        );
        assert!(!history.evicts_by_age());
    }

    #[tokio::test]
    async fn concurrent_saves_all_land() {
        let history = Arc::new(RingBufferHistory::new(64));
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let history = history.clone();
                tokio::spawn(async move { history.save("prod", at(i), &snapshot("s")).await })
            })
            .collect();
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert_eq!(
            history.entries_by_cluster("prod", at(0), at(31)).await.unwrap().len(),
            32
        );
    }
}
