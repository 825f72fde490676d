//! Where the list of monitored clusters comes from.

pub mod continuous_pipe;
pub mod in_memory;
pub mod within_k8s;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::cluster::Cluster;

#[async_trait]
pub trait ClusterListProvider: Send + Sync {
    async fn clusters(&self) -> Result<Vec<Cluster>>;

    async fn by_identifier(&self, identifier: &str) -> Result<Cluster> {
        self.clusters()
            .await?
            .into_iter()
            .find(|c| c.identifier == identifier)
            .ok_or_else(|| Error::NotFound(format!("cluster {}", identifier)))
    }
}
