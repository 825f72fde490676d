use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::Error;
use crate::history::HistoryEntry;
use crate::models::status::ClusterSnapshot;

use super::ApiError;

/// `?from=&to=` in RFC 3339, e.g. `2017-03-01T12:00:00Z`.
#[derive(Debug, Default, Deserialize)]
pub struct Window {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Window {
    /// Missing or unparsable bounds fall back to the last 24 hours.
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let parse = |raw: &Option<String>| {
            raw.as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        let from = parse(&self.from).unwrap_or(now - Duration::hours(24));
        let to = parse(&self.to).unwrap_or(now);
        (from, to)
    }
}

pub async fn list_entries(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Query(window): Query<Window>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let cluster = state.clusters.by_identifier(&cluster).await?;
    let (from, to) = window.resolve(Utc::now());
    let entries = state
        .history
        .entries_by_cluster(&cluster.identifier, from, to)
        .await?;
    Ok(Json(entries))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path((_cluster, entry)): Path<(String, String)>,
) -> Result<Json<ClusterSnapshot>, ApiError> {
    let id = Uuid::parse_str(&entry)
        .map_err(|_| Error::InvalidInput(format!("{:?} is not a history entry id", entry)))?;
    Ok(Json(state.history.fetch(id).await?))
}
