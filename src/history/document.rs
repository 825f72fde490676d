use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::ops::Bound;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::status::ClusterSnapshot;

use super::{HistoryEntry, StatusHistory};

/// Namespace of the name-based entry identifiers.
const ENTRY_NAMESPACE: Uuid = Uuid::from_u128(0x0bca_f5df_8117_440c_96f2_2f54_9905_4299);

/// Identifier of the entry for `cluster_identifier` at `time`. The same pair
/// always maps to the same document, so replaying a save overwrites it.
pub fn entry_id(cluster_identifier: &str, time: DateTime<Utc>) -> Uuid {
    let name = format!(
        "{}{}",
        cluster_identifier,
        time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    Uuid::new_v5(&ENTRY_NAMESPACE, name.as_bytes())
}

/// A stored entry: metadata plus the serialized snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDocument {
    pub entry: HistoryEntry,
    pub payload: Vec<u8>,
}

/// Which documents a query or deletion applies to.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    pub cluster: Option<String>,
    pub from: Bound<DateTime<Utc>>,
    pub to: Bound<DateTime<Utc>>,
}

/// Queryable key/value store of history documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the document with the same id.
    async fn put(&self, doc: HistoryDocument) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<HistoryDocument>>;

    /// Metadata of matching documents, oldest first.
    async fn query(&self, filter: &EntryFilter) -> Result<Vec<HistoryEntry>>;

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64>;
}

/// [`StatusHistory`] over an external [`DocumentStore`].
pub struct DocumentHistory<S> {
    store: S,
}

impl<S: DocumentStore> DocumentHistory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: DocumentStore> StatusHistory for DocumentHistory<S> {
    #[instrument(skip(self, snapshot))]
    async fn save(
        &self,
        cluster_identifier: &str,
        time: DateTime<Utc>,
        snapshot: &ClusterSnapshot,
    ) -> Result<Uuid> {
        let payload = serde_json::to_vec(snapshot)
            .map_err(|e| Error::Store(format!("serializing snapshot: {}", e)))?;
        let entry = HistoryEntry {
            id: entry_id(cluster_identifier, time),
            cluster_identifier: cluster_identifier.to_string(),
            entry_time: time,
        };
        let id = entry.id;
        self.store.put(HistoryDocument { entry, payload }).await?;
        Ok(id)
    }

    async fn entries_by_cluster(
        &self,
        cluster_identifier: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        self.store
            .query(&EntryFilter {
                cluster: Some(cluster_identifier.to_string()),
                from: Bound::Included(from),
                to: Bound::Included(to),
            })
            .await
    }

    async fn fetch(&self, id: Uuid) -> Result<ClusterSnapshot> {
        let doc = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("history entry {}", id)))?;
        serde_json::from_slice(&doc.payload)
            .map_err(|e| Error::Store(format!("decoding snapshot {}: {}", id, e)))
    }

    #[instrument(skip(self))]
    async fn remove_entries_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let expired = self
            .store
            .query(&EntryFilter {
                cluster: None,
                from: Bound::Unbounded,
                to: Bound::Excluded(cutoff),
            })
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = expired.iter().map(|e| e.id).collect();
        let removed = self.store.delete_many(&ids).await?;
        debug!(removed, "evicted history entries");
        Ok(removed)
    }
}
