//! Normalized snapshot shapes served by the API and persisted in history.
//!
//! JSON keys follow the wire format the dashboard already consumes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::k8s;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLimits<T> {
    pub requests: T,
    pub limits: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMemory<T> {
    pub cpu: T,
    pub memory: T,
}

/// Aggregated requests and limits of the pods scheduled on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub cpu: RequestLimits<String>,
    pub memory: RequestLimits<String>,
    /// Integer percentages of allocatable capacity, truncated and clamped to 0..=100.
    pub percent_of_available: CpuMemory<RequestLimits<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub name: String,
    pub creation_timestamp: String,
    pub status: Readiness,
    pub conditions: Vec<k8s::NodeCondition>,
    /// Only collected while the node is not ready.
    #[serde(default)]
    pub events: Vec<k8s::Event>,
    pub resources: ResourceSummary,
    pub capacity: CpuMemory<String>,
    pub allocatable: CpuMemory<String>,
    pub volumes_in_use: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Running,
    Terminated,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    /// `None` until the container shows up in the pod's live status.
    pub state: Option<ContainerState>,
    pub is_ready: bool,
    pub restart_count: i32,
    pub resources: CpuMemory<RequestLimits<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "status")]
    pub phase: String,
    pub creation_timestamp: String,
    pub is_ready: bool,
    pub node_name: String,
    pub containers: Vec<ContainerStatus>,
    /// Only collected while the pod is not ready.
    #[serde(default)]
    pub events: Vec<k8s::Event>,
}

/// One point-in-time view of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeStatus>,
    /// Pods grouped by namespace.
    pub pods: BTreeMap<String, Vec<PodStatus>>,
    /// Non-fatal problems met while building the snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
