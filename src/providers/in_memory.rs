use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::cluster::Cluster;

use super::ClusterListProvider;

/// Clusters file layout:
///
/// ```yaml
/// clusters:
///   - identifier: prod
///     address: https://10.0.0.1
///     username: admin
///     password: secret
/// ```
#[derive(Debug, Deserialize)]
struct ClustersFile {
    #[serde(default)]
    clusters: Vec<Cluster>,
}

/// A fixed list, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClusterList {
    clusters: Vec<Cluster>,
}

impl InMemoryClusterList {
    pub fn new(clusters: Vec<Cluster>) -> Result<Self> {
        let mut seen = HashSet::new();
        for c in &clusters {
            if c.identifier.is_empty() {
                return Err(Error::Config(format!(
                    "cluster at {} has no identifier",
                    c.address
                )));
            }
            if !seen.insert(c.identifier.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate cluster identifier {:?}",
                    c.identifier
                )));
            }
        }
        Ok(Self { clusters })
    }

    /// Parse the JSON array held in `CLUSTER_LIST`.
    pub fn from_json(data: &str) -> Result<Self> {
        let clusters: Vec<Cluster> = serde_json::from_str(data)
            .map_err(|e| Error::Config(format!("parsing cluster list: {}", e)))?;
        Self::new(clusters)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let file: ClustersFile = serde_yaml::from_str(data)
            .map_err(|e| Error::Config(format!("parsing clusters file: {}", e)))?;
        Self::new(file.clusters)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading clusters file {}: {}", path.display(), e)))?;
        Self::from_yaml(&data)
    }
}

#[async_trait]
impl ClusterListProvider for InMemoryClusterList {
    async fn clusters(&self) -> Result<Vec<Cluster>> {
        Ok(self.clusters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_list_with_capitalized_field_names() {
        let list = InMemoryClusterList::from_json(
            r#"[
                {"Identifier": "prod", "Address": "https://1.2.3.4", "Username": "admin", "Password": "pw"},
                {"identifier": "dev", "address": "https://5.6.7.8", "token": "t0k"}
            ]"#,
        )
        .unwrap();

        let clusters = list.clusters().await.unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].username.as_deref(), Some("admin"));

        let dev = list.by_identifier("dev").await.unwrap();
        assert_eq!(dev.token.as_deref(), Some("t0k"));
    }

    #[tokio::test]
    async fn unknown_identifier_is_not_found() {
        let list = InMemoryClusterList::default();
        assert!(matches!(
            list.by_identifier("nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn yaml_file_layout() {
        let list = InMemoryClusterList::from_yaml(
            "clusters:\n  - identifier: prod\n    address: https://10.0.0.1\n    username: admin\n    password: secret\n",
        )
        .unwrap();
        assert_eq!(list.clusters.len(), 1);
        assert_eq!(list.clusters[0].address, "https://10.0.0.1");
    }

    #[test]
    fn rejects_duplicates_and_garbage() {
        let dup = r#"[{"identifier":"a","address":"x"},{"identifier":"a","address":"y"}]"#;
        assert!(matches!(
            InMemoryClusterList::from_json(dup),
            Err(Error::Config(_))
        ));
        assert!(InMemoryClusterList::from_json("not json").is_err());
        assert!(InMemoryClusterList::load(Path::new("/nonexistent/clusters.yaml")).is_err());
    }
}
