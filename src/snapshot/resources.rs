//! Resource quantity parsing and per-node request/limit aggregation.
//!
//! CPU is accounted in millicores and memory in bytes, both rounded up the
//! way the control plane rounds `MilliValue()` / `Value()`.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::helpers::{format_bytes, format_millicores};
use crate::models::k8s::{self, RESOURCE_CPU, RESOURCE_MEMORY, ResourceList};
use crate::models::status::{CpuMemory, RequestLimits, ResourceSummary};

/// `<digits>[.<digits>]` followed by a decimal exponent or a unit suffix.
static QUANTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)?(?:\.(\d*))?([eE][+-]?\d+|[a-zA-Z]*)$").unwrap());

const MAX_DIGITS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid quantity {input:?}: {reason}")]
pub struct QuantityError {
    input: String,
    reason: &'static str,
}

impl QuantityError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Parse a CPU quantity ("250m", "0.5", "2") into millicores.
pub fn parse_cpu_millis(input: &str) -> std::result::Result<u64, QuantityError> {
    parse_scaled(input, 3)
}

/// Parse a memory quantity ("128Mi", "1G", "1e9") into bytes.
pub fn parse_memory_bytes(input: &str) -> std::result::Result<u64, QuantityError> {
    parse_scaled(input, 0)
}

/// Parse `input` and express it in units of `10^-unit_exp`, rounding up.
fn parse_scaled(input: &str, unit_exp: i32) -> std::result::Result<u64, QuantityError> {
    let s = input.trim();
    let caps = QUANTITY_REGEX
        .captures(s)
        .ok_or_else(|| QuantityError::new(input, "not a quantity"))?;

    let int = caps.get(1).map_or("", |m| m.as_str());
    let frac = caps.get(2).map_or("", |m| m.as_str());
    let suffix = caps.get(3).map_or("", |m| m.as_str());

    if int.is_empty() && frac.is_empty() {
        return Err(QuantityError::new(input, "missing digits"));
    }
    if int.len() + frac.len() > MAX_DIGITS {
        return Err(QuantityError::new(input, "too many digits"));
    }

    let mantissa: u128 = format!("{}{}", int, frac)
        .parse()
        .map_err(|_| QuantityError::new(input, "not a number"))?;
    if mantissa == 0 {
        return Ok(0);
    }

    let (binary_pow, decimal_exp) = suffix_scale(suffix).ok_or_else(|| {
        QuantityError::new(input, "unknown suffix")
    })?;

    let overflow = || QuantityError::new(input, "out of range");
    let mut value = mantissa
        .checked_mul(1024u128.pow(binary_pow))
        .ok_or_else(overflow)?;

    let exp10 = decimal_exp + unit_exp - frac.len() as i32;
    if exp10 >= 0 {
        let factor = 10u128.checked_pow(exp10 as u32).ok_or_else(overflow)?;
        value = value.checked_mul(factor).ok_or_else(overflow)?;
    } else if -exp10 > 38 {
        // Smaller than one unit but non-zero.
        value = 1;
    } else {
        value = value.div_ceil(10u128.pow((-exp10) as u32));
    }

    u64::try_from(value).map_err(|_| overflow())
}

/// (power of 1024, power of 10) for a quantity suffix.
fn suffix_scale(suffix: &str) -> Option<(u32, i32)> {
    let scale = match suffix {
        "" => (0, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        "Ki" => (1, 0),
        "Mi" => (2, 0),
        "Gi" => (3, 0),
        "Ti" => (4, 0),
        "Pi" => (5, 0),
        "Ei" => (6, 0),
        exp if exp.starts_with(['e', 'E']) => {
            let e: i32 = exp[1..].parse().ok()?;
            if e.abs() > 64 {
                return None;
            }
            (0, e)
        }
        _ => return None,
    };
    Some(scale)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub cpu_millis: u64,
    pub memory_bytes: u64,
}

impl Usage {
    fn from_list(list: &ResourceList) -> std::result::Result<Self, QuantityError> {
        let cpu_millis = match list.get(RESOURCE_CPU) {
            Some(q) => parse_cpu_millis(q)?,
            None => 0,
        };
        let memory_bytes = match list.get(RESOURCE_MEMORY) {
            Some(q) => parse_memory_bytes(q)?,
            None => 0,
        };
        Ok(Self {
            cpu_millis,
            memory_bytes,
        })
    }

    fn add(self, other: Usage) -> Usage {
        Usage {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
        }
    }

    fn max(self, other: Usage) -> Usage {
        Usage {
            cpu_millis: self.cpu_millis.max(other.cpu_millis),
            memory_bytes: self.memory_bytes.max(other.memory_bytes),
        }
    }

    pub fn display(&self) -> CpuMemory<String> {
        CpuMemory {
            cpu: format_millicores(self.cpu_millis),
            memory: format_bytes(self.memory_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodResources {
    pub requests: Usage,
    pub limits: Usage,
}

/// Effective requests and limits of a pod: the sum over its containers,
/// raised to the largest init container since those run one at a time.
pub fn pod_resources(pod: &k8s::Pod) -> std::result::Result<PodResources, QuantityError> {
    let mut total = PodResources::default();
    for c in &pod.spec.containers {
        total.requests = total.requests.add(Usage::from_list(&c.resources.requests)?);
        total.limits = total.limits.add(Usage::from_list(&c.resources.limits)?);
    }
    for c in &pod.spec.init_containers {
        total.requests = total.requests.max(Usage::from_list(&c.resources.requests)?);
        total.limits = total.limits.max(Usage::from_list(&c.resources.limits)?);
    }
    Ok(total)
}

/// Raw and schedulable capacity of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCapacity {
    pub capacity: Usage,
    pub allocatable: Usage,
}

impl NodeCapacity {
    pub fn of(node: &k8s::Node) -> Result<Self> {
        let parse = |list: &ResourceList| {
            Usage::from_list(list).map_err(|e| Error::ResourceAggregation {
                subject: format!("node {}", node.metadata.name),
                reason: e.to_string(),
            })
        };
        let capacity = parse(&node.status.capacity)?;
        let allocatable = if node.status.allocatable.is_empty() {
            capacity
        } else {
            parse(&node.status.allocatable)?
        };
        Ok(Self {
            capacity,
            allocatable,
        })
    }
}

/// Aggregated usage of a node's pods against its allocatable capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResources {
    pub requests: Usage,
    pub limits: Usage,
    pub percent: CpuMemory<RequestLimits<u32>>,
}

impl NodeResources {
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            cpu: RequestLimits {
                requests: format_millicores(self.requests.cpu_millis),
                limits: format_millicores(self.limits.cpu_millis),
            },
            memory: RequestLimits {
                requests: format_bytes(self.requests.memory_bytes),
                limits: format_bytes(self.limits.memory_bytes),
            },
            percent_of_available: self.percent.clone(),
        }
    }
}

/// Integer percentage of `available` taken by `used`, truncated and clamped
/// to 100. Zero capacity yields 0.
pub fn percent_of(used: u64, available: u64) -> u32 {
    if available == 0 {
        return 0;
    }
    let pct = (used as u128 * 100) / available as u128;
    pct.min(100) as u32
}

pub fn compute_node_resources<'a>(
    allocatable: Usage,
    pods: impl IntoIterator<Item = &'a k8s::Pod>,
) -> Result<NodeResources> {
    let mut requests = Usage::default();
    let mut limits = Usage::default();

    for pod in pods {
        let r = pod_resources(pod).map_err(|e| Error::ResourceAggregation {
            subject: format!("pod {}/{}", pod.metadata.namespace, pod.metadata.name),
            reason: e.to_string(),
        })?;
        requests = requests.add(r.requests);
        limits = limits.add(r.limits);
    }

    let percent = CpuMemory {
        cpu: RequestLimits {
            requests: percent_of(requests.cpu_millis, allocatable.cpu_millis),
            limits: percent_of(limits.cpu_millis, allocatable.cpu_millis),
        },
        memory: RequestLimits {
            requests: percent_of(requests.memory_bytes, allocatable.memory_bytes),
            limits: percent_of(limits.memory_bytes, allocatable.memory_bytes),
        },
    };

    Ok(NodeResources {
        requests,
        limits,
        percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{node, pod};

    #[test]
    fn parses_cpu_quantities() {
        assert_eq!(parse_cpu_millis("500m"), Ok(500));
        assert_eq!(parse_cpu_millis("2"), Ok(2000));
        assert_eq!(parse_cpu_millis("0.5"), Ok(500));
        assert_eq!(parse_cpu_millis(".25"), Ok(250));
        assert_eq!(parse_cpu_millis("1.5"), Ok(1500));
        // 100 microcores round up to one millicore
        assert_eq!(parse_cpu_millis("100u"), Ok(1));
        assert_eq!(parse_cpu_millis("1e3"), Ok(1_000_000));
        assert_eq!(parse_cpu_millis("0"), Ok(0));
    }

    #[test]
    fn parses_memory_quantities() {
        assert_eq!(parse_memory_bytes("128Mi"), Ok(134_217_728));
        assert_eq!(parse_memory_bytes("1G"), Ok(1_000_000_000));
        assert_eq!(parse_memory_bytes("1.5Gi"), Ok(1_610_612_736));
        assert_eq!(parse_memory_bytes("1e3"), Ok(1000));
        assert_eq!(parse_memory_bytes("2E"), Ok(2_000_000_000_000_000_000));
        assert_eq!(parse_memory_bytes(" 64Ki "), Ok(65_536));
    }

    #[test]
    fn rejects_malformed_quantities() {
        for bad in ["", "abc", "-1", "1Zi", "1.2.3", ".", "1e", "10mi"] {
            assert!(parse_memory_bytes(bad).is_err(), "{:?} should not parse", bad);
        }
        assert!(parse_memory_bytes("100Ei").is_err());
    }

    #[test]
    fn percent_truncates_and_clamps() {
        assert_eq!(percent_of(500, 2000), 25);
        assert_eq!(percent_of(999, 1000), 99);
        assert_eq!(percent_of(3000, 2000), 100);
        assert_eq!(percent_of(0, 1000), 0);
    }

    #[test]
    fn zero_allocatable_gives_zero_percent() {
        let p = pod("default", "web", "node1", Some("500m"), Some("1Gi"), true);
        let res = compute_node_resources(Usage::default(), [&p]).unwrap();
        assert_eq!(res.requests.cpu_millis, 500);
        assert_eq!(res.percent.cpu.requests, 0);
        assert_eq!(res.percent.memory.requests, 0);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let pods = vec![
            pod("a", "p1", "n", Some("250m"), Some("64Mi"), true),
            pod("a", "p2", "n", Some("1"), Some("1Gi"), true),
            pod("b", "p3", "n", Some("0.1"), None, false),
        ];
        let allocatable = Usage {
            cpu_millis: 4000,
            memory_bytes: 8 * 1024 * 1024 * 1024,
        };

        let forward = compute_node_resources(allocatable, pods.iter()).unwrap();
        let backward = compute_node_resources(allocatable, pods.iter().rev()).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.requests.cpu_millis, 250 + 1000 + 100);
        assert_eq!(forward.requests.memory_bytes, (64 + 1024) * 1024 * 1024);
        assert_eq!(forward.percent.cpu.requests, 33);
    }

    #[test]
    fn two_node_scenario() {
        let node1 = node("node1", "2000m", "4Gi", true);
        let node2 = node("node2", "1000m", "4Gi", true);
        let p = pod("default", "api", "node1", Some("500m"), None, true);

        let cap1 = NodeCapacity::of(&node1).unwrap();
        let cap2 = NodeCapacity::of(&node2).unwrap();
        let r1 = compute_node_resources(cap1.allocatable, [&p]).unwrap();
        let r2 = compute_node_resources(cap2.allocatable, std::iter::empty::<&k8s::Pod>()).unwrap();

        assert_eq!(r1.percent.cpu.requests, 25);
        assert_eq!(r2.percent.cpu.requests, 0);
        assert_eq!(r1.summary().cpu.requests, "500m");
    }

    #[test]
    fn init_containers_raise_requests_to_their_max() {
        let mut p = pod("default", "job", "n", Some("100m"), None, true);
        let mut init = p.spec.containers[0].clone();
        init.name = "init".to_string();
        init.resources
            .requests
            .insert(RESOURCE_CPU.to_string(), "1".to_string());
        p.spec.init_containers.push(init);

        let r = pod_resources(&p).unwrap();
        assert_eq!(r.requests.cpu_millis, 1000);
    }

    #[test]
    fn unset_limits_count_as_zero() {
        let p = pod("default", "web", "n", Some("200m"), Some("128Mi"), true);
        let r = pod_resources(&p).unwrap();
        assert_eq!(r.limits, Usage::default());
    }

    #[test]
    fn malformed_pod_quantity_is_propagated() {
        let good = pod("default", "ok", "n", Some("100m"), None, true);
        let bad = pod("default", "broken", "n", Some("lots"), None, true);

        let err = compute_node_resources(Usage::default(), [&good, &bad]).unwrap_err();
        match err {
            Error::ResourceAggregation { subject, .. } => assert_eq!(subject, "pod default/broken"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn allocatable_falls_back_to_capacity() {
        let mut n = node("n", "4", "8Gi", true);
        n.status.allocatable.clear();
        let cap = NodeCapacity::of(&n).unwrap();
        assert_eq!(cap.allocatable.cpu_millis, 4000);
        assert_eq!(cap.allocatable, cap.capacity);
    }
}
