use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::cluster::{Cluster, Credentials};
use crate::models::k8s::{EventList, Node, NodeList, Pod, PodList, VersionInfo};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("building HTTP client: {0}")]
    Build(String),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} rejected the credentials ({status})")]
    Unauthorized { url: String, status: u16 },

    #[error("GET {url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Object whose events are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Node { name: String },
    Pod { namespace: String, name: String, uid: String },
}

impl EventTarget {
    pub fn for_node(node: &Node) -> Self {
        Self::Node {
            name: node.metadata.name.clone(),
        }
    }

    pub fn for_pod(pod: &Pod) -> Self {
        Self::Pod {
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            uid: pod.metadata.uid.clone(),
        }
    }

    /// Namespace to search in, `None` for cluster-wide.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Node { .. } => None,
            Self::Pod { namespace, .. } => Some(namespace),
        }
    }

    pub fn field_selector(&self) -> String {
        match self {
            Self::Node { name } => {
                format!("involvedObject.kind=Node,involvedObject.name={}", name)
            }
            Self::Pod {
                namespace,
                name,
                uid,
            } => {
                let mut selector = format!(
                    "involvedObject.name={},involvedObject.namespace={}",
                    name, namespace
                );
                if !uid.is_empty() {
                    selector.push_str(&format!(",involvedObject.uid={}", uid));
                }
                selector
            }
        }
    }
}

impl std::fmt::Display for EventTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node { name } => write!(f, "node {}", name),
            Self::Pod {
                namespace, name, ..
            } => write!(f, "pod {}/{}", namespace, name),
        }
    }
}

/// Read-only view of one cluster's control plane.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_nodes(&self) -> Result<NodeList, ClientError>;

    /// Pods bound to `node_name` that are neither Succeeded nor Failed.
    async fn list_node_pods(&self, node_name: &str) -> Result<PodList, ClientError>;

    async fn search_events(&self, target: &EventTarget) -> Result<EventList, ClientError>;
}

/// Opens sessions against cluster control planes.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ClusterApi>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Accept self-signed control-plane certificates.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }
}

pub struct KubeClient {
    pub address: String,
    http: Client,
    credentials: Credentials,
}

impl KubeClient {
    pub fn new(cluster: &Cluster, options: &ClientOptions) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            address: cluster.address.trim_end_matches('/').to_string(),
            http,
            credentials: cluster.credentials(),
        })
    }

    pub async fn version(&self) -> Result<VersionInfo, ClientError> {
        self.get_json("/version", &[]).await
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Basic { username, password } => req.basic_auth(username, password.as_ref()),
            Credentials::Bearer(token) => req.bearer_auth(token),
            Credentials::Anonymous => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.address, path);
        debug!(%url, ?query, "GET");

        let resp = self
            .authorize(self.http.get(&url))
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized {
                url,
                status: status.as_u16(),
            });
        }
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        resp.json()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }
}

#[async_trait]
impl ClusterApi for KubeClient {
    async fn list_nodes(&self) -> Result<NodeList, ClientError> {
        self.get_json("/api/v1/nodes", &[]).await
    }

    async fn list_node_pods(&self, node_name: &str) -> Result<PodList, ClientError> {
        let selector = format!(
            "spec.nodeName={},status.phase!=Succeeded,status.phase!=Failed",
            node_name
        );
        self.get_json("/api/v1/pods", &[("fieldSelector", &selector)])
            .await
    }

    async fn search_events(&self, target: &EventTarget) -> Result<EventList, ClientError> {
        let path = match target.namespace() {
            Some(ns) => format!("/api/v1/namespaces/{}/events", ns),
            None => "/api/v1/events".to_string(),
        };
        let selector = target.field_selector();
        self.get_json(&path, &[("fieldSelector", &selector)]).await
    }
}

/// Connects over HTTPS with the cluster's own credentials, probing `/version`
/// so unreachable or unauthorized clusters fail before any listing.
pub struct KubeConnector {
    options: ClientOptions,
}

impl KubeConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ClusterApi>, ClientError> {
        let client = KubeClient::new(cluster, &self.options)?;
        let version = client.version().await?;
        debug!(
            cluster = %cluster.identifier,
            version = %version.git_version,
            "connected to control plane"
        );
        Ok(Arc::new(client))
    }
}
