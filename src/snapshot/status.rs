use std::collections::HashMap;

use crate::error::Result;
use crate::helpers::{format_bytes, format_millicores};
use crate::models::k8s::{self, RESOURCE_CPU, RESOURCE_MEMORY, ResourceList};
use crate::models::status::{
    ContainerState, ContainerStatus, CpuMemory, NodeStatus, PodStatus, Readiness, RequestLimits,
};

use super::resources::{self, NodeCapacity, parse_cpu_millis, parse_memory_bytes};

const CONDITION_READY: &str = "Ready";
const CONDITION_TRUE: &str = "True";

/// A node is ready only when its `Ready` condition reports `True`.
pub fn node_readiness(node: &k8s::Node) -> Readiness {
    let ready = node
        .status
        .conditions
        .iter()
        .any(|c| c.condition_type == CONDITION_READY && c.status == CONDITION_TRUE);
    if ready {
        Readiness::Ready
    } else {
        Readiness::NotReady
    }
}

pub fn is_pod_ready(pod: &k8s::Pod) -> bool {
    pod.status
        .conditions
        .iter()
        .any(|c| c.condition_type == CONDITION_READY && c.status == CONDITION_TRUE)
}

/// Running wins over Terminated, anything else is Waiting.
pub fn container_state(state: &k8s::ContainerState) -> ContainerState {
    if state.running.is_some() {
        ContainerState::Running
    } else if state.terminated.is_some() {
        ContainerState::Terminated
    } else {
        ContainerState::Waiting
    }
}

/// Build the status of a node from the pods scheduled on it.
///
/// Returns `Ok(None)` for a node without any condition: the control plane
/// has not reported on it yet, so there is nothing meaningful to show.
pub fn build_node_status<'a>(
    node: &k8s::Node,
    pods: impl IntoIterator<Item = &'a k8s::Pod>,
    events: Vec<k8s::Event>,
) -> Result<Option<NodeStatus>> {
    if node.status.conditions.is_empty() {
        return Ok(None);
    }

    let capacity = NodeCapacity::of(node)?;
    let usage = resources::compute_node_resources(capacity.allocatable, pods)?;

    Ok(Some(NodeStatus {
        name: node.metadata.name.clone(),
        creation_timestamp: node.metadata.creation_timestamp.clone().unwrap_or_default(),
        status: node_readiness(node),
        conditions: node.status.conditions.clone(),
        events,
        resources: usage.summary(),
        capacity: capacity.capacity.display(),
        allocatable: capacity.allocatable.display(),
        volumes_in_use: node.status.volumes_in_use.len(),
    }))
}

pub fn build_pod_status(pod: &k8s::Pod, events: Vec<k8s::Event>) -> PodStatus {
    PodStatus {
        namespace: pod.metadata.namespace.clone(),
        name: pod.metadata.name.clone(),
        phase: pod.status.phase.clone(),
        creation_timestamp: pod.metadata.creation_timestamp.clone().unwrap_or_default(),
        is_ready: is_pod_ready(pod),
        node_name: pod.spec.node_name.clone(),
        containers: build_container_statuses(pod),
        events,
    }
}

/// One entry per declared container, matched to its live status by name.
fn build_container_statuses(pod: &k8s::Pod) -> Vec<ContainerStatus> {
    let live: HashMap<&str, &k8s::ContainerStatus> = pod
        .status
        .container_statuses
        .iter()
        .map(|s| (s.name.as_str(), s))
        .collect();

    pod.spec
        .containers
        .iter()
        .map(|c| {
            let status = live.get(c.name.as_str());
            ContainerStatus {
                name: c.name.clone(),
                state: status.map(|s| container_state(&s.state)),
                is_ready: status.is_some_and(|s| s.ready),
                restart_count: status.map_or(0, |s| s.restart_count),
                resources: CpuMemory {
                    cpu: RequestLimits {
                        requests: display_cpu(&c.resources.requests),
                        limits: display_cpu(&c.resources.limits),
                    },
                    memory: RequestLimits {
                        requests: display_memory(&c.resources.requests),
                        limits: display_memory(&c.resources.limits),
                    },
                },
            }
        })
        .collect()
}

// Unparseable quantities are shown as reported; aggregation is where they fail.
fn display_cpu(list: &ResourceList) -> String {
    match list.get(RESOURCE_CPU) {
        Some(q) => parse_cpu_millis(q).map_or_else(|_| q.clone(), format_millicores),
        None => "0".to_string(),
    }
}

fn display_memory(list: &ResourceList) -> String {
    match list.get(RESOURCE_MEMORY) {
        Some(q) => parse_memory_bytes(q).map_or_else(|_| q.clone(), format_bytes),
        None => "0".to_string(),
    }
}
