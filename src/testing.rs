//! Builders and in-process fakes shared by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::AppState;
use crate::clients::{ClientError, ClusterApi, ClusterConnector, EventTarget};
use crate::history::StatusHistory;
use crate::models::cluster::Cluster;
use crate::models::k8s::{
    self, Container, EventList, Node, NodeCondition, NodeList, ObjectMeta, Pod, PodCondition,
    PodList, RESOURCE_CPU, RESOURCE_MEMORY,
};
use crate::providers::in_memory::InMemoryClusterList;
use crate::snapshot::fetcher::SnapshotFetcher;

pub fn node(name: &str, cpu: &str, memory: &str, ready: bool) -> Node {
    let resources: k8s::ResourceList = [
        (RESOURCE_CPU.to_string(), cpu.to_string()),
        (RESOURCE_MEMORY.to_string(), memory.to_string()),
    ]
    .into_iter()
    .collect();

    Node {
        metadata: ObjectMeta {
            name: name.to_string(),
            uid: format!("uid-{}", name),
            creation_timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            ..Default::default()
        },
        status: k8s::NodeStatus {
            conditions: vec![NodeCondition {
                condition_type: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }],
            capacity: resources.clone(),
            allocatable: resources,
            volumes_in_use: Vec::new(),
        },
        ..Default::default()
    }
}

pub fn pod(
    namespace: &str,
    name: &str,
    node_name: &str,
    cpu_request: Option<&str>,
    memory_request: Option<&str>,
    ready: bool,
) -> Pod {
    let mut container = Container {
        name: "main".to_string(),
        image: "nginx:latest".to_string(),
        ..Default::default()
    };
    if let Some(cpu) = cpu_request {
        container
            .resources
            .requests
            .insert(RESOURCE_CPU.to_string(), cpu.to_string());
    }
    if let Some(memory) = memory_request {
        container
            .resources
            .requests
            .insert(RESOURCE_MEMORY.to_string(), memory.to_string());
    }

    Pod {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: format!("uid-{}-{}", namespace, name),
            creation_timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            ..Default::default()
        },
        spec: k8s::PodSpec {
            node_name: node_name.to_string(),
            containers: vec![container],
            init_containers: Vec::new(),
        },
        status: k8s::PodStatus {
            phase: if ready { "Running" } else { "Pending" }.to_string(),
            conditions: vec![PodCondition {
                condition_type: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
            }],
            container_statuses: Vec::new(),
        },
        ..Default::default()
    }
}

pub fn event(target: &EventTarget, reason: &str) -> k8s::Event {
    let (namespace, name) = match target {
        EventTarget::Node { name } => (String::new(), name.clone()),
        EventTarget::Pod {
            namespace, name, ..
        } => (namespace.clone(), name.clone()),
    };
    k8s::Event {
        involved_object: k8s::ObjectReference {
            kind: match target {
                EventTarget::Node { .. } => "Node".to_string(),
                EventTarget::Pod { .. } => "Pod".to_string(),
            },
            namespace,
            name,
            uid: String::new(),
        },
        reason: reason.to_string(),
        event_type: "Warning".to_string(),
        count: 1,
        ..Default::default()
    }
}

pub fn cluster(identifier: &str) -> Cluster {
    Cluster {
        identifier: identifier.to_string(),
        address: format!("https://{}.example", identifier),
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        token: None,
    }
}

fn failure(what: &str) -> ClientError {
    ClientError::Status {
        url: format!("fake://{}", what),
        status: 500,
        body: "injected failure".to_string(),
    }
}

/// Scripted control plane. Pods are served per node the way the real field
/// selector would, unless a node is listed in `failing_nodes`.
#[derive(Default)]
pub struct FakeApi {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub events: HashMap<EventTarget, Vec<k8s::Event>>,
    pub fail_list_nodes: bool,
    pub failing_nodes: HashSet<String>,
    pub failing_events: HashSet<EventTarget>,
    pub delay: Option<Duration>,
    pub event_calls: AtomicUsize,
}

impl FakeApi {
    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl ClusterApi for FakeApi {
    async fn list_nodes(&self) -> Result<NodeList, ClientError> {
        self.pause().await;
        if self.fail_list_nodes {
            return Err(failure("nodes"));
        }
        Ok(NodeList {
            items: self.nodes.clone(),
            ..Default::default()
        })
    }

    async fn list_node_pods(&self, node_name: &str) -> Result<PodList, ClientError> {
        self.pause().await;
        if self.failing_nodes.contains(node_name) {
            return Err(failure(&format!("pods/{}", node_name)));
        }
        Ok(PodList {
            items: self
                .pods
                .iter()
                .filter(|p| p.spec.node_name == node_name)
                .filter(|p| p.status.phase != "Succeeded" && p.status.phase != "Failed")
                .cloned()
                .collect(),
            ..Default::default()
        })
    }

    async fn search_events(&self, target: &EventTarget) -> Result<EventList, ClientError> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing_events.contains(target) {
            return Err(failure(&format!("events/{}", target)));
        }
        Ok(EventList {
            items: self.events.get(target).cloned().unwrap_or_default(),
            ..Default::default()
        })
    }
}

/// Hands out [`FakeApi`]s by cluster address.
#[derive(Default)]
pub struct FakeConnector {
    pub apis: HashMap<String, Arc<FakeApi>>,
    pub refused: HashSet<String>,
}

impl FakeConnector {
    pub fn with(mut self, cluster: &Cluster, api: FakeApi) -> Self {
        self.apis.insert(cluster.address.clone(), Arc::new(api));
        self
    }

    pub fn refusing(mut self, cluster: &Cluster) -> Self {
        self.refused.insert(cluster.address.clone());
        self
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ClusterApi>, ClientError> {
        if self.refused.contains(&cluster.address) {
            return Err(ClientError::Unauthorized {
                url: cluster.address.clone(),
                status: 401,
            });
        }
        match self.apis.get(&cluster.address) {
            Some(api) => Ok(api.clone() as Arc<dyn ClusterApi>),
            None => Err(failure(&cluster.address)),
        }
    }
}

/// Router state over fakes, with short deadlines.
pub fn app_state(
    connector: FakeConnector,
    clusters: Vec<Cluster>,
    history: Arc<dyn StatusHistory>,
) -> AppState {
    AppState {
        fetcher: Arc::new(SnapshotFetcher::new(
            Arc::new(connector),
            Duration::from_secs(5),
            Duration::from_secs(10),
        )),
        clusters: Arc::new(InMemoryClusterList::new(clusters).expect("unique identifiers")),
        history,
    }
}
