use async_trait::async_trait;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::cluster::Cluster;

use super::ClusterListProvider;

pub const IDENTIFIER: &str = "k8s";
pub const TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// The cluster this process runs in, reached through its service account.
#[derive(Debug, Clone)]
pub struct WithinClusterProvider {
    cluster: Cluster,
}

impl WithinClusterProvider {
    pub fn new(host: &str, port: &str, token: &str) -> Self {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        Self {
            cluster: Cluster {
                identifier: IDENTIFIER.to_string(),
                address: format!("https://{}:{}", host, port),
                username: None,
                password: None,
                token: Some(token.trim().to_string()),
            },
        }
    }

    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{} is not set, not running in a cluster?", name)))
        };
        let host = var("KUBERNETES_SERVICE_HOST")?;
        let port = var("KUBERNETES_SERVICE_PORT")?;
        let token = std::fs::read_to_string(Path::new(TOKEN_PATH))
            .map_err(|e| Error::Config(format!("reading service account token: {}", e)))?;
        Ok(Self::new(&host, &port, &token))
    }
}

#[async_trait]
impl ClusterListProvider for WithinClusterProvider {
    async fn clusters(&self) -> Result<Vec<Cluster>> {
        Ok(vec![self.cluster.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_cluster_with_bearer_token() {
        let provider = WithinClusterProvider::new("10.96.0.1", "443", "abc\n");
        let c = provider.by_identifier("k8s").await.unwrap();
        assert_eq!(c.address, "https://10.96.0.1:443");
        assert_eq!(c.token.as_deref(), Some("abc"));
        assert!(provider.by_identifier("other").await.is_err());
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let provider = WithinClusterProvider::new("fd00::1", "6443", "t");
        assert_eq!(provider.cluster.address, "https://[fd00::1]:6443");
    }
}
