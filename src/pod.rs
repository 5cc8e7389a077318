//! Type definitions for the Pod primitive tracked by the cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// Annotation carrying the caller's desired container resource changes.
pub const ANNOTATION_RESIZE_RESOURCES: &str = "resize-resources";
/// Annotation selecting how infeasible in-place resizes are handled.
pub const ANNOTATION_RESIZE_RESOURCES_POLICY: &str = "resize-resources-policy";

/// Output values written back into [`ANNOTATION_RESIZE_RESOURCES`] by the resize planner.
pub mod resize_action {
    pub const UPDATE: &str = "Update";
    pub const RESCHEDULE: &str = "Reschedule";
    pub const NONE_PER_POLICY: &str = "NonePerPolicy";
}

/// Input values read from [`ANNOTATION_RESIZE_RESOURCES_POLICY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePolicy {
    #[default]
    InPlacePreferred,
    InPlaceOnly,
    Restart,
}

impl ResizePolicy {
    pub fn parse(value: &str) -> Self {
        match value {
            "InPlaceOnly" => ResizePolicy::InPlaceOnly,
            "Restart" => ResizePolicy::Restart,
            _ => ResizePolicy::InPlacePreferred,
        }
    }
}

/// Stable identity for a pod: two pods with the same namespace/name but a
/// different uid are distinct entries in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: uid.into(),
        }
    }

    pub fn of(pod: &Pod) -> Self {
        Self {
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            uid: pod.metadata.uid.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMetadata {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: Resource,
    #[serde(default)]
    pub limits: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    pub host_ip: String,
    pub host_port: u16,
    pub protocol: PortProtocolKey,
}

/// Serializable surrogate for [`PortProtocol`] so it can key a map without
/// pulling in an extra derive for hashing on the enum directly.
pub type PortProtocolKey = String;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Empty until the pod is placed on a node.
    #[serde(default)]
    pub node_name: String,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub host_ports: Vec<HostPort>,
}

/// A pod description as consumed by the cache. Immutable once stored: the
/// cache hands out `Arc<Pod>` clones rather than deep copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: PodMetadata,
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    pub fn key(&self) -> PodKey {
        PodKey::of(self)
    }

    pub fn node_name(&self) -> &str {
        &self.spec.node_name
    }

    /// Sum of every container's resource requests.
    pub fn total_requests(&self) -> Resource {
        let mut total = Resource::default();
        for container in &self.spec.containers {
            total.add(&container.resources.requests);
        }
        total
    }

    /// Same as [`Pod::total_requests`] but a container with a fully-zero
    /// request contributes a small non-zero estimate instead, matching the
    /// scheduler's "non-zero requested" bookkeeping used to avoid
    /// over-packing nodes with best-effort pods.
    pub fn total_non_zero_requests(&self, default_milli_cpu: u64, default_memory: u64) -> Resource {
        let mut total = Resource::default();
        for container in &self.spec.containers {
            let requests = &container.resources.requests;
            let milli_cpu = if requests.milli_cpu == 0 {
                default_milli_cpu
            } else {
                requests.milli_cpu
            };
            let memory = if requests.memory == 0 {
                default_memory
            } else {
                requests.memory
            };
            total.milli_cpu += milli_cpu;
            total.memory += memory;
        }
        total
    }

    pub fn resize_policy(&self) -> ResizePolicy {
        self.metadata
            .annotations
            .get(ANNOTATION_RESIZE_RESOURCES_POLICY)
            .map(|v| ResizePolicy::parse(v))
            .unwrap_or_default()
    }

    pub fn resize_request(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_RESIZE_RESOURCES)
            .map(|s| s.as_str())
    }

    pub fn set_resize_action(&mut self, action: &str) {
        self.metadata
            .annotations
            .insert(ANNOTATION_RESIZE_RESOURCES.to_string(), action.to_string());
    }
}

/// A single entry of the resize-request annotation: the desired resource
/// changes for one named container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResizeContainerRequest {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_uid_is_distinct_key() {
        let a = PodKey::new("default", "web", "uid-1");
        let b = PodKey::new("default", "web", "uid-2");
        assert_ne!(a, b);
    }

    #[test]
    fn total_requests_sums_containers() {
        let pod = Pod {
            spec: PodSpec {
                node_name: "node-a".to_string(),
                containers: vec![
                    Container {
                        name: "c1".to_string(),
                        resources: ResourceRequirements {
                            requests: Resource::new(500, 1024),
                            ..Default::default()
                        },
                    },
                    Container {
                        name: "c2".to_string(),
                        resources: ResourceRequirements {
                            requests: Resource::new(250, 512),
                            ..Default::default()
                        },
                    },
                ],
            },
            ..Default::default()
        };
        let total = pod.total_requests();
        assert_eq!(total.milli_cpu, 750);
        assert_eq!(total.memory, 1536);
    }

    #[test]
    fn non_zero_requests_substitutes_default_for_zero_containers() {
        let pod = Pod {
            spec: PodSpec {
                node_name: "node-a".to_string(),
                containers: vec![Container {
                    name: "c1".to_string(),
                    resources: ResourceRequirements::default(),
                }],
            },
            ..Default::default()
        };
        let total = pod.total_non_zero_requests(100, 200);
        assert_eq!(total.milli_cpu, 100);
        assert_eq!(total.memory, 200);
    }

    #[test]
    fn resize_policy_defaults_to_in_place_preferred() {
        let pod = Pod::default();
        assert_eq!(pod.resize_policy(), ResizePolicy::InPlacePreferred);
    }
}
