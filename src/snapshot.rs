//! Deep-copied, read-only view of the cache, safe to read without synchronization.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::node_info::NodeInfo;
use crate::pdb::DisruptionBudget;
use crate::pod::PodKey;

/// A fully detached snapshot of the cache at a point in time. Mutating the
/// live cache after taking a snapshot never affects the snapshot, and vice
/// versa: there is no shared mutable state between the two.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub nodes: HashMap<String, NodeInfo>,
    pub assumed_pods: HashSet<PodKey>,
    pub pdbs: HashMap<String, Arc<DisruptionBudget>>,
}
