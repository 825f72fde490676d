use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::Error;
use crate::models::cluster::Cluster;
use crate::models::status::ClusterSnapshot;

use super::ApiError;

pub async fn list_clusters(State(state): State<AppState>) -> Result<Json<Vec<Cluster>>, ApiError> {
    let clusters = state.clusters.clusters().await?;
    Ok(Json(clusters.iter().map(Cluster::obfuscated).collect()))
}

/// Live snapshot, never served from history.
pub async fn cluster_status(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<ClusterSnapshot>, ApiError> {
    let cluster = state.clusters.by_identifier(&identifier).await?;
    Ok(Json(state.fetcher.fetch_cluster(&cluster).await?))
}

/// Connection details of the legacy endpoint.
#[derive(Debug, Deserialize)]
pub struct ClusterRequest {
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn legacy_full_status(
    State(state): State<AppState>,
    body: Result<Json<ClusterRequest>, JsonRejection>,
) -> Result<Json<ClusterSnapshot>, ApiError> {
    let Json(req) = body.map_err(|e| Error::InvalidInput(e.body_text()))?;
    if req.address.trim().is_empty() {
        return Err(Error::InvalidInput("address is required".to_string()).into());
    }
    info!(address = %req.address, "full status requested");

    let cluster = Cluster {
        identifier: req.address.clone(),
        address: req.address,
        username: req.username,
        password: req.password,
        token: req.token,
    };
    Ok(Json(state.fetcher.fetch_cluster(&cluster).await?))
}

pub async fn healthz() -> &'static str {
    "ok"
}
