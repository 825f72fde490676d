//! Snapshot history: where scheduled snapshots go and how they are read back.
//!
//! Two backends share the [`StatusHistory`] interface. The ring buffer bounds
//! itself by slot count; the document backend relies on the
//! [`gc::GarbageCollector`] for age-based eviction.

pub mod document;
pub mod gc;
pub mod ring;
pub mod scheduler;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::status::ClusterSnapshot;

/// Metadata of one stored snapshot. Listing never carries the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEntry {
    #[serde(rename = "UUID")]
    pub id: Uuid,
    pub cluster_identifier: String,
    pub entry_time: DateTime<Utc>,
}

#[async_trait]
pub trait StatusHistory: Send + Sync {
    async fn save(
        &self,
        cluster_identifier: &str,
        time: DateTime<Utc>,
        snapshot: &ClusterSnapshot,
    ) -> Result<Uuid>;

    /// Entries of one cluster with `from <= entry_time <= to`, oldest first.
    async fn entries_by_cluster(
        &self,
        cluster_identifier: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>>;

    async fn fetch(&self, id: Uuid) -> Result<ClusterSnapshot>;

    /// Drop entries strictly older than `cutoff`, returning how many went.
    async fn remove_entries_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Whether retention is up to the garbage collector.
    fn evicts_by_age(&self) -> bool {
        true
    }
}
