use futures_util::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, instrument, warn};

use crate::clients::{ClientError, ClusterApi, ClusterConnector, EventTarget};
use crate::error::{Error, Result};
use crate::models::cluster::Cluster;
use crate::models::k8s::{Event, Node, Pod};
use crate::models::status::{ClusterSnapshot, Readiness};

use super::status::{build_node_status, build_pod_status, is_pod_ready, node_readiness};

/// Builds one [`ClusterSnapshot`] per call, querying the control plane
/// concurrently and degrading per node rather than failing the whole fetch.
pub struct SnapshotFetcher {
    connector: Arc<dyn ClusterConnector>,
    call_timeout: Duration,
    fetch_timeout: Duration,
}

/// Bound a single remote call.
async fn with_deadline<T>(
    after: Duration,
    call: impl Future<Output = std::result::Result<T, ClientError>>,
) -> std::result::Result<T, ClientError> {
    time::timeout(after, call)
        .await
        .unwrap_or(Err(ClientError::Timeout(after)))
}

struct NodePods {
    node: Node,
    pods: Vec<Pod>,
}

impl SnapshotFetcher {
    pub fn new(
        connector: Arc<dyn ClusterConnector>,
        call_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            call_timeout,
            fetch_timeout,
        }
    }

    #[instrument(skip_all, fields(cluster = %cluster.identifier))]
    pub async fn fetch_cluster(&self, cluster: &Cluster) -> Result<ClusterSnapshot> {
        match time::timeout(self.fetch_timeout, self.fetch(cluster)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: format!("snapshot of cluster {}", cluster.identifier),
                after: self.fetch_timeout,
            }),
        }
    }

    async fn fetch(&self, cluster: &Cluster) -> Result<ClusterSnapshot> {
        let api = with_deadline(self.call_timeout, self.connector.connect(cluster))
            .await
            .map_err(|e| Error::Connection {
                cluster: cluster.identifier.clone(),
                reason: e.to_string(),
            })?;

        let nodes = with_deadline(self.call_timeout, api.list_nodes())
            .await
            .map_err(|e| Error::List {
                cluster: cluster.identifier.clone(),
                reason: e.to_string(),
            })?
            .items;
        debug!(nodes = nodes.len(), "listed nodes");

        let mut warnings = Vec::new();
        let (nodes, skipped): (Vec<Node>, Vec<Node>) = nodes
            .into_iter()
            .partition(|n| !n.status.conditions.is_empty());
        for n in skipped {
            warn!(node = %n.metadata.name, "node reports no conditions, skipping");
        }

        let listed = self.list_pods(&api, nodes, &mut warnings).await;
        let mut events = self.collect_events(&api, &listed, &mut warnings).await;

        let mut snapshot = ClusterSnapshot::default();
        for NodePods { node, pods } in &listed {
            let node_events = events
                .remove(&EventTarget::for_node(node))
                .unwrap_or_default();
            match build_node_status(node, pods, node_events) {
                Ok(Some(status)) => snapshot.nodes.push(status),
                Ok(None) => {}
                Err(e) => record(&mut warnings, e),
            }

            for pod in pods {
                let pod_events = events.remove(&EventTarget::for_pod(pod)).unwrap_or_default();
                snapshot
                    .pods
                    .entry(pod.metadata.namespace.clone())
                    .or_default()
                    .push(build_pod_status(pod, pod_events));
            }
        }

        snapshot.nodes.sort_by(|a, b| a.name.cmp(&b.name));
        for pods in snapshot.pods.values_mut() {
            pods.sort_by(|a, b| a.name.cmp(&b.name));
        }
        snapshot.warnings = warnings;
        Ok(snapshot)
    }

    /// One task per node. A node whose pods cannot be listed is dropped.
    async fn list_pods(
        &self,
        api: &Arc<dyn ClusterApi>,
        nodes: Vec<Node>,
        warnings: &mut Vec<String>,
    ) -> Vec<NodePods> {
        let handles: Vec<_> = nodes
            .iter()
            .map(|node| {
                let api = api.clone();
                let name = node.metadata.name.clone();
                let deadline = self.call_timeout;
                tokio::spawn(async move { with_deadline(deadline, api.list_node_pods(&name)).await })
            })
            .collect();

        let results = join_all(handles).await;

        let mut listed = Vec::with_capacity(nodes.len());
        for (node, result) in nodes.into_iter().zip(results) {
            let entity = format!("pods of node {}", node.metadata.name);
            match result {
                Ok(Ok(list)) => {
                    // Only pods bound to this node count toward its totals.
                    let pods = list
                        .items
                        .into_iter()
                        .filter(|p| p.spec.node_name == node.metadata.name)
                        .collect();
                    listed.push(NodePods { node, pods });
                }
                Ok(Err(e)) => record(
                    warnings,
                    Error::PartialFetch {
                        entity,
                        reason: e.to_string(),
                    },
                ),
                Err(e) => record(
                    warnings,
                    Error::PartialFetch {
                        entity,
                        reason: e.to_string(),
                    },
                ),
            }
        }
        listed
    }

    /// Events of every not-ready node and pod, fetched concurrently.
    async fn collect_events(
        &self,
        api: &Arc<dyn ClusterApi>,
        listed: &[NodePods],
        warnings: &mut Vec<String>,
    ) -> HashMap<EventTarget, Vec<Event>> {
        let mut targets = Vec::new();
        for NodePods { node, pods } in listed {
            if node_readiness(node) == Readiness::NotReady {
                targets.push(EventTarget::for_node(node));
            }
            targets.extend(
                pods.iter()
                    .filter(|p| !is_pod_ready(p))
                    .map(EventTarget::for_pod),
            );
        }

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let api = api.clone();
                let target = target.clone();
                let deadline = self.call_timeout;
                tokio::spawn(async move { with_deadline(deadline, api.search_events(&target)).await })
            })
            .collect();

        let results = join_all(handles).await;

        let mut events = HashMap::with_capacity(targets.len());
        for (target, result) in targets.into_iter().zip(results) {
            let reason = match result {
                Ok(Ok(list)) => {
                    events.insert(target, list.items);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            record(
                warnings,
                Error::PartialFetch {
                    entity: format!("events of {}", target),
                    reason,
                },
            );
        }
        events
    }
}

fn record(warnings: &mut Vec<String>, error: Error) {
    warn!(error = %error, "degraded snapshot");
    warnings.push(error.to_string());
}
