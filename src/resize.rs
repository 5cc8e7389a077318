//! Decide whether a pod resize event fits in place or must reschedule.
//!
//! Triggered from `SchedulerCache::update` whenever the incoming pod carries
//! a `resize-resources` annotation. Grounded in the original scheduler
//! cache's `processPodResourcesResizeRequest`/`getPodResizeRequirements`,
//! reworked into a typed, error-propagating Rust function instead of the
//! source's string-formatted errors and debug prints.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::info;

use crate::error::CacheError;
use crate::node_info::NodeInfo;
use crate::pod::{resize_action, Pod, ResizeContainerRequest, ResizePolicy};
use crate::resource::Resource;

/// Runs the resize planner against `new_pod`, mutating its annotations (and,
/// if in-place resizing is feasible, its container resource fields) in place.
/// A no-op if `new_pod` carries no resize-request annotation.
pub fn plan_resize(
    nodes: &mut HashMap<String, NodeInfo>,
    generation_counter: &AtomicU64,
    old_pod: &Arc<Pod>,
    new_pod: &mut Pod,
) -> Result<(), CacheError> {
    let Some(raw_request) = new_pod.resize_request() else {
        return Ok(());
    };
    if raw_request.is_empty() {
        return Ok(());
    }
    let raw_request = raw_request.to_string();

    let policy = new_pod.resize_policy();
    if policy == ResizePolicy::Restart {
        new_pod.set_resize_action(resize_action::RESCHEDULE);
        return Ok(());
    }

    let requested_containers: Vec<ResizeContainerRequest> = serde_json::from_str(&raw_request)?;
    let requested_by_name: HashMap<String, ResizeContainerRequest> = requested_containers
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    let target_pod_resource = target_pod_resource(new_pod, &requested_by_name);

    let node_name = new_pod.node_name().to_string();
    let node = nodes
        .get_mut(&node_name)
        .ok_or_else(|| CacheError::NodeNotFound(node_name.clone()))?;

    // Dry run: remove the old pod, read the totals that would apply if the
    // resize were applied right now, then put it straight back so the dry
    // run has no externally observable effect.
    node.remove_pod(&old_pod.key(), generation_counter)?;
    let allocatable = node.allocatable();
    let requested = node.requested().clone();
    node.add_pod(Arc::clone(old_pod), generation_counter);

    let feasible = is_feasible(&allocatable, &requested, &target_pod_resource);

    if feasible {
        apply_resize(new_pod, &requested_by_name);
        new_pod.set_resize_action(resize_action::UPDATE);
    } else if policy == ResizePolicy::InPlaceOnly {
        info!(
            pod = %new_pod.metadata.name,
            node = %node_name,
            "in-place resize rejected by policy"
        );
        new_pod.set_resize_action(resize_action::NONE_PER_POLICY);
    } else {
        new_pod.set_resize_action(resize_action::RESCHEDULE);
    }

    Ok(())
}

fn target_pod_resource(
    pod: &Pod,
    requested_by_name: &HashMap<String, ResizeContainerRequest>,
) -> Resource {
    let mut total = Resource::default();
    for container in &pod.spec.containers {
        let requests = requested_by_name
            .get(&container.name)
            .map(|r| r.resources.requests.clone())
            .unwrap_or_else(|| container.resources.requests.clone());
        total.add(&requests);
    }
    total
}

/// Strict inequality, not `>=`: preserves a safety margin rather than
/// packing a node to exactly its allocatable ceiling.
fn is_feasible(allocatable: &Resource, requested: &Resource, target: &Resource) -> bool {
    allocatable.milli_cpu > requested.milli_cpu + target.milli_cpu
        && allocatable.memory > requested.memory + target.memory
}

fn apply_resize(pod: &mut Pod, requested_by_name: &HashMap<String, ResizeContainerRequest>) {
    for container in &mut pod.spec.containers {
        if let Some(resize) = requested_by_name.get(&container.name) {
            container.resources.requests = resize.resources.requests.clone();
            container.resources.limits = resize.resources.limits.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{Container, PodMetadata, PodSpec, ResourceRequirements, ANNOTATION_RESIZE_RESOURCES};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    fn node_with_capacity(milli_cpu: u64, memory: u64) -> NodeInfo {
        use crate::node::{Node, NodeMetadata, NodeStatus};
        let mut info = NodeInfo::new();
        let counter = AtomicU64::new(0);
        info.set_node(
            Arc::new(Node {
                metadata: NodeMetadata {
                    name: "node-a".to_string(),
                    ..Default::default()
                },
                status: NodeStatus {
                    capacity: Resource::new(milli_cpu, memory),
                    allocatable: Resource::new(milli_cpu, memory),
                    ..Default::default()
                },
            }),
            &counter,
        );
        info
    }

    fn pod_with_request(milli_cpu: u64, memory: u64) -> Arc<Pod> {
        Arc::new(Pod {
            metadata: PodMetadata {
                namespace: "default".to_string(),
                name: "web".to_string(),
                uid: "uid-1".to_string(),
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

    fn resize_annotation(milli_cpu: u64, memory: u64) -> String {
        serde_json::to_string(&vec![ResizeContainerRequest {
            name: "main".to_string(),
            resources: ResourceRequirements {
                requests: Resource::new(milli_cpu, memory),
                limits: Resource::new(milli_cpu, memory),
            },
        }])
        .unwrap()
    }

    #[test]
    fn in_place_feasible_updates_pod_and_leaves_resources_consistent() {
        let counter = AtomicU64::new(0);
        let mut node = node_with_capacity(4000, 8 * 1024 * 1024 * 1024);
        let old_pod = pod_with_request(500, 1024 * 1024 * 1024);
        node.add_pod(Arc::clone(&old_pod), &counter);

        let mut nodes = HashMap::new();
        nodes.insert("node-a".to_string(), node);

        let mut new_pod = (*old_pod).clone();
        new_pod.metadata.annotations.insert(
            ANNOTATION_RESIZE_RESOURCES.to_string(),
            resize_annotation(1500, 3 * 1024 * 1024 * 1024),
        );

        plan_resize(&mut nodes, &counter, &old_pod, &mut new_pod).unwrap();

        assert_eq!(
            new_pod.metadata.annotations.get(ANNOTATION_RESIZE_RESOURCES),
            Some(&resize_action::UPDATE.to_string())
        );
        assert_eq!(new_pod.spec.containers[0].resources.requests.milli_cpu, 1500);
        // dry run must have restored the node's pre-update totals
        assert_eq!(nodes["node-a"].requested().milli_cpu, 500);
    }

    #[test]
    fn in_place_infeasible_with_in_place_only_rejects_without_mutation() {
        let counter = AtomicU64::new(0);
        let mut node = node_with_capacity(4000, 7 * 1024 * 1024 * 1024);
        let old_pod = pod_with_request(500, 1024 * 1024 * 1024);
        node.add_pod(Arc::clone(&old_pod), &counter);
        // pad requested totals to match the boundary scenario: 3500m/7Gi total
        let padding = pod_with_request(3000, 6 * 1024 * 1024 * 1024);
        node.add_pod(padding, &counter);

        let mut nodes = HashMap::new();
        nodes.insert("node-a".to_string(), node);

        let mut new_pod = (*old_pod).clone();
        new_pod.metadata.annotations.insert(
            ANNOTATION_RESIZE_RESOURCES.to_string(),
            resize_annotation(1500, 3 * 1024 * 1024 * 1024),
        );
        new_pod
            .metadata
            .annotations
            .insert("resize-resources-policy".to_string(), "InPlaceOnly".to_string());

        plan_resize(&mut nodes, &counter, &old_pod, &mut new_pod).unwrap();

        assert_eq!(
            new_pod.metadata.annotations.get(ANNOTATION_RESIZE_RESOURCES),
            Some(&resize_action::NONE_PER_POLICY.to_string())
        );
        assert_eq!(new_pod.spec.containers[0].resources.requests.milli_cpu, 500);
        assert_eq!(nodes["node-a"].requested().milli_cpu, 3500);
    }

    #[test]
    fn restart_policy_short_circuits_to_reschedule() {
        let counter = AtomicU64::new(0);
        let mut node = node_with_capacity(4000, 8 * 1024 * 1024 * 1024);
        let old_pod = pod_with_request(500, 1024 * 1024 * 1024);
        node.add_pod(Arc::clone(&old_pod), &counter);
        let mut nodes = HashMap::new();
        nodes.insert("node-a".to_string(), node);

        let mut new_pod = (*old_pod).clone();
        new_pod.metadata.annotations.insert(
            ANNOTATION_RESIZE_RESOURCES.to_string(),
            resize_annotation(1500, 3 * 1024 * 1024 * 1024),
        );
        new_pod
            .metadata
            .annotations
            .insert("resize-resources-policy".to_string(), "Restart".to_string());

        plan_resize(&mut nodes, &counter, &old_pod, &mut new_pod).unwrap();
        assert_eq!(
            new_pod.metadata.annotations.get(ANNOTATION_RESIZE_RESOURCES),
            Some(&resize_action::RESCHEDULE.to_string())
        );
    }

    #[test]
    fn missing_node_fails() {
        let counter = AtomicU64::new(0);
        let mut nodes: HashMap<String, NodeInfo> = HashMap::new();
        let old_pod = pod_with_request(500, 1024);
        let mut new_pod = (*old_pod).clone();
        new_pod.metadata.annotations.insert(
            ANNOTATION_RESIZE_RESOURCES.to_string(),
            resize_annotation(600, 2048),
        );
        assert_eq!(
            plan_resize(&mut nodes, &counter, &old_pod, &mut new_pod).unwrap_err(),
            CacheError::NodeNotFound("node-a".to_string())
        );
    }

    #[test]
    fn unparseable_annotation_is_rejected() {
        let counter = AtomicU64::new(0);
        let mut node = node_with_capacity(4000, 8 * 1024 * 1024 * 1024);
        let old_pod = pod_with_request(500, 1024);
        node.add_pod(Arc::clone(&old_pod), &counter);
        let mut nodes = HashMap::new();
        nodes.insert("node-a".to_string(), node);

        let mut new_pod = (*old_pod).clone();
        new_pod
            .metadata
            .annotations
            .insert(ANNOTATION_RESIZE_RESOURCES.to_string(), "not json".to_string());

        assert!(plan_resize(&mut nodes, &counter, &old_pod, &mut new_pod).is_err());
    }
}
