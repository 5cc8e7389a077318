//! Per-pod lifecycle record tracked alongside the assumed-pod set.

use std::sync::Arc;
use std::time::Instant;

use crate::pod::Pod;

/// Lifecycle record for one pod. Presence in the cache's assumed-set
/// distinguishes Assumed from Added; this struct alone can't tell them apart.
#[derive(Debug, Clone)]
pub struct PodState {
    pub pod: Arc<Pod>,
    /// Set by `finish_binding`; the expiration loop may only remove the pod
    /// once `Instant::now() > deadline` AND `binding_finished` is true.
    pub deadline: Option<Instant>,
    pub binding_finished: bool,
}

impl PodState {
    pub fn new(pod: Arc<Pod>) -> Self {
        Self {
            pod,
            deadline: None,
            binding_finished: false,
        }
    }
}
