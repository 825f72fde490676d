//! SQLite-backed [`DocumentStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::ops::Bound;
use std::str::FromStr;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::HistoryEntry;
use super::document::{DocumentStore, EntryFilter, HistoryDocument};

/// SQLite caps bound parameters per statement.
const DELETE_CHUNK: usize = 500;

fn store_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

/// Column value of a stored entry time: nanoseconds since the epoch.
fn entry_nanos(time: DateTime<Utc>) -> Result<i64> {
    time.timestamp_nanos_opt()
        .ok_or_else(|| Error::Store(format!("entry time {} out of range", time)))
}

/// Query bound in nanoseconds. Times past the representable range clamp to
/// its ends, which every stored entry lies within.
fn bound_nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt()
        .unwrap_or(if time.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (creating if needed) the database at `url`, e.g. `sqlite://var/history.db`.
    #[instrument]
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Config(format!("invalid database url {}: {}", url, e)))?
            .create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Config(format!("creating {}: {}", parent.display(), e))
                })?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.migrate().await?;
        info!("history database ready");
        Ok(store)
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(store_err)?;
        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history_entries (
                id TEXT PRIMARY KEY,
                cluster_identifier TEXT NOT NULL,
                entry_time INTEGER NOT NULL,
                payload BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_cluster_time ON history_entries(cluster_identifier, entry_time)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_time ON history_entries(entry_time)")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<HistoryEntry> {
    let id: String = row.try_get("id").map_err(store_err)?;
    let nanos: i64 = row.try_get("entry_time").map_err(store_err)?;
    Ok(HistoryEntry {
        id: Uuid::parse_str(&id).map_err(|e| Error::Store(format!("bad id {}: {}", id, e)))?,
        cluster_identifier: row.try_get("cluster_identifier").map_err(store_err)?,
        entry_time: DateTime::from_timestamp_nanos(nanos),
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn put(&self, doc: HistoryDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history_entries (id, cluster_identifier, entry_time, payload)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                cluster_identifier = excluded.cluster_identifier,
                entry_time = excluded.entry_time,
                payload = excluded.payload
            "#,
        )
        .bind(doc.entry.id.to_string())
        .bind(&doc.entry.cluster_identifier)
        .bind(entry_nanos(doc.entry.entry_time)?)
        .bind(doc.payload)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<HistoryDocument>> {
        let row = sqlx::query(
            "SELECT id, cluster_identifier, entry_time, payload FROM history_entries WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => Ok(Some(HistoryDocument {
                entry: entry_from_row(&row)?,
                payload: row.try_get("payload").map_err(store_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn query(&self, filter: &EntryFilter) -> Result<Vec<HistoryEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, cluster_identifier, entry_time FROM history_entries WHERE 1 = 1",
        );
        if let Some(cluster) = &filter.cluster {
            qb.push(" AND cluster_identifier = ").push_bind(cluster.clone());
        }
        match filter.from {
            Bound::Included(t) => {
                qb.push(" AND entry_time >= ").push_bind(bound_nanos(t));
            }
            Bound::Excluded(t) => {
                qb.push(" AND entry_time > ").push_bind(bound_nanos(t));
            }
            Bound::Unbounded => {}
        }
        match filter.to {
            Bound::Included(t) => {
                qb.push(" AND entry_time <= ").push_bind(bound_nanos(t));
            }
            Bound::Excluded(t) => {
                qb.push(" AND entry_time < ").push_bind(bound_nanos(t));
            }
            Bound::Unbounded => {}
        }
        qb.push(" ORDER BY entry_time ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(store_err)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM history_entries WHERE id IN (");
            let mut list = qb.separated(", ");
            for id in chunk {
                list.push_bind(id.to_string());
            }
            list.push_unseparated(")");

            removed += qb
                .build()
                .execute(&self.pool)
                .await
                .map_err(store_err)?
                .rows_affected();
        }
        Ok(removed)
    }
}
