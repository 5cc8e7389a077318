//! Type definitions for the Node primitive tracked by the cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: Option<String>,
    pub effect: TaintEffect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConditions {
    pub ready: bool,
    pub memory_pressure: bool,
    pub disk_pressure: bool,
    pub pid_pressure: bool,
    pub network_unavailable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub capacity: Resource,
    pub allocatable: Resource,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub conditions: NodeConditions,
}

/// A node description as attached to a [`crate::node_info::NodeInfo`].
/// Immutable once stored, shared via `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: NodeMetadata,
    pub status: NodeStatus,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
