//! Per-node aggregate of accounted pods and derived resource totals.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::CacheError;
use crate::node::Node;
use crate::pod::{HostPort, Pod, PodKey};
use crate::resource::Resource;

/// Default milliCPU substituted for a container that requests zero CPU,
/// mirroring the upstream scheduler's defaulting for "non-zero requested".
pub const DEFAULT_MILLI_CPU_REQUEST: u64 = 100;
/// Default memory (200MiB) substituted for a container that requests zero memory.
pub const DEFAULT_MEMORY_REQUEST: u64 = 200 * 1024 * 1024;

/// Aggregate bookkeeping for all pods currently accounted to one node.
///
/// `generation` is bumped on every mutation using a process-wide counter
/// shared across every `NodeInfo`, so that generations are globally
/// comparable and strictly increasing, not just per-node monotonic.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    node: Option<Arc<Node>>,
    pods: HashMap<PodKey, Arc<Pod>>,
    requested: Resource,
    non_zero_requested: Resource,
    used_ports: HashSet<HostPort>,
    generation: u64,
}

impl NodeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Option<&Arc<Node>> {
        self.node.as_ref()
    }

    pub fn pods(&self) -> impl Iterator<Item = &Arc<Pod>> {
        self.pods.values()
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    pub fn contains_pod(&self, key: &PodKey) -> bool {
        self.pods.contains_key(key)
    }

    pub fn requested(&self) -> &Resource {
        &self.requested
    }

    pub fn non_zero_requested(&self) -> &Resource {
        &self.non_zero_requested
    }

    pub fn allocatable(&self) -> Resource {
        self.node
            .as_ref()
            .map(|n| n.status.allocatable.clone())
            .unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty() && self.node.is_none()
    }

    fn bump_generation(&mut self, counter: &AtomicU64) {
        self.generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
    }

    /// Account `pod`'s requests into the node's totals and index it by key.
    pub fn add_pod(&mut self, pod: Arc<Pod>, generation_counter: &AtomicU64) {
        self.requested.add(&pod.total_requests());
        self.non_zero_requested
            .add(&pod.total_non_zero_requests(DEFAULT_MILLI_CPU_REQUEST, DEFAULT_MEMORY_REQUEST));
        for port in &pod.status.host_ports {
            self.used_ports.insert(port.clone());
        }
        self.pods.insert(pod.key(), pod);
        self.bump_generation(generation_counter);
    }

    /// Reverse the effect of [`NodeInfo::add_pod`]. Fails if the pod isn't present.
    pub fn remove_pod(
        &mut self,
        key: &PodKey,
        generation_counter: &AtomicU64,
    ) -> Result<Arc<Pod>, CacheError> {
        let pod = self
            .pods
            .remove(key)
            .ok_or_else(|| CacheError::PodNotFound(key.clone()))?;
        self.requested.sub(&pod.total_requests());
        self.non_zero_requested
            .sub(&pod.total_non_zero_requests(DEFAULT_MILLI_CPU_REQUEST, DEFAULT_MEMORY_REQUEST));
        for port in &pod.status.host_ports {
            self.used_ports.remove(port);
        }
        self.bump_generation(generation_counter);
        Ok(pod)
    }

    pub fn set_node(&mut self, node: Arc<Node>, generation_counter: &AtomicU64) {
        self.node = Some(node);
        self.bump_generation(generation_counter);
    }

    pub fn remove_node(&mut self, generation_counter: &AtomicU64) {
        self.node = None;
        self.bump_generation(generation_counter);
    }

    /// Swap the stored pod description for `key` without touching resource
    /// totals or bumping the generation. Used when a pod transitions from
    /// Assumed to Added on the same node: the accounting already happened
    /// in `add_pod` during `assume`, only the cached description changes.
    pub fn replace_pod_description(&mut self, key: &PodKey, pod: Arc<Pod>) {
        self.pods.insert(key.clone(), pod);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{Container, Pod, PodMetadata, PodSpec, ResourceRequirements};

    fn pod_with_request(uid: &str, milli_cpu: u64, memory: u64) -> Arc<Pod> {
        Arc::new(Pod {
            metadata: PodMetadata {
                namespace: "default".to_string(),
                name: format!("pod-{uid}"),
                uid: uid.to_string(),
                ..Default::default()
            },
            spec: PodSpec {
                node_name: "node-a".to_string(),
                containers: vec![Container {
                    name: "main".to_string(),
                    resources: ResourceRequirements {
                        requests: Resource::new(milli_cpu, memory),
                        ..Default::default()
                    },
                }],
            },
            ..Default::default()
        })
    }

    #[test]
    fn add_then_remove_restores_totals() {
        let counter = AtomicU64::new(0);
        let mut info = NodeInfo::new();
        let pod = pod_with_request("1", 500, 1024);
        let key = pod.key();
        info.add_pod(pod, &counter);
        assert_eq!(info.requested().milli_cpu, 500);
        info.remove_pod(&key, &counter).unwrap();
        assert_eq!(info.requested().milli_cpu, 0);
        assert!(info.pods().next().is_none());
    }

    #[test]
    fn remove_missing_pod_fails() {
        let counter = AtomicU64::new(0);
        let mut info = NodeInfo::new();
        let key = PodKey::new("default", "ghost", "u1");
        assert_eq!(
            info.remove_pod(&key, &counter).unwrap_err(),
            CacheError::PodNotFound(key)
        );
    }

    #[test]
    fn generation_strictly_increases_across_mutations() {
        let counter = AtomicU64::new(0);
        let mut info = NodeInfo::new();
        let pod = pod_with_request("1", 500, 1024);
        let key = pod.key();
        info.add_pod(pod, &counter);
        let gen_after_add = info.generation();
        info.remove_pod(&key, &counter).unwrap();
        assert!(info.generation() > gen_after_add);
    }

    #[test]
    fn is_empty_requires_no_pods_and_no_node() {
        let counter = AtomicU64::new(0);
        let mut info = NodeInfo::new();
        assert!(info.is_empty());
        let pod = pod_with_request("1", 1, 1);
        let key = pod.key();
        info.add_pod(pod, &counter);
        assert!(!info.is_empty());
        info.remove_pod(&key, &counter).unwrap();
        assert!(info.is_empty());
    }
}
