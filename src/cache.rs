//! The scheduler cache: top-level coordinator, state machine, and locking.
//!
//! All state lives behind a single mutex rather than per-field locks: every
//! operation below touches more than one map (a node's pod list, its
//! resource totals, the assumed set), so splitting the lock would just move
//! the races into application code that has to keep several locks in sync.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{error, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::node::Node;
use crate::node_info::NodeInfo;
use crate::pdb::DisruptionBudget;
use crate::pod::{Pod, PodKey};
use crate::pod_state::PodState;
use crate::resize;
use crate::selector::LabelSelector;
use crate::snapshot::Snapshot;

/// All cache state guarded by the single exclusive lock. Kept separate from
/// [`SchedulerCache`] so the lock-acquisition boundary is visible at a glance.
#[derive(Default)]
struct CacheState {
    nodes: HashMap<String, NodeInfo>,
    pod_states: HashMap<PodKey, PodState>,
    assumed_pods: HashSet<PodKey>,
    pdbs: HashMap<String, Arc<DisruptionBudget>>,
}

impl CacheState {
    fn node_entry(&mut self, name: &str) -> &mut NodeInfo {
        self.nodes.entry(name.to_string()).or_default()
    }

    fn add_pod_to_node(&mut self, pod: Arc<Pod>, generation_counter: &AtomicU64) {
        self.node_entry(pod.node_name()).add_pod(pod, generation_counter);
    }

    fn remove_pod_from_node(
        &mut self,
        pod: &Pod,
        generation_counter: &AtomicU64,
    ) -> Result<Arc<Pod>, CacheError> {
        let node_name = pod.node_name().to_string();
        let node = self
            .nodes
            .get_mut(&node_name)
            .ok_or_else(|| CacheError::PodNotFound(pod.key()))?;
        let removed = node.remove_pod(&pod.key(), generation_counter)?;
        if node.is_empty() {
            self.nodes.remove(&node_name);
        }
        Ok(removed)
    }
}

/// An authoritative in-memory store of pod placement across cluster nodes.
///
/// Cloning a `SchedulerCache` is cheap: it shares the same lock and state via
/// `Arc`, so every scheduler worker, watch-event handler, and the expiration
/// task can hold its own handle without passing references around.
#[derive(Clone)]
pub struct SchedulerCache {
    state: Arc<Mutex<CacheState>>,
    generation_counter: Arc<AtomicU64>,
    config: CacheConfig,
}

impl SchedulerCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            generation_counter: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().expect("scheduler cache lock poisoned")
    }

    /// Optimistically place `pod` on its target node before the bind API
    /// call that will confirm it has actually started.
    pub fn assume(&self, pod: Pod) -> Result<(), CacheError> {
        let mut state = self.lock();
        let key = pod.key();
        if state.pod_states.contains_key(&key) {
            return Err(CacheError::AlreadyPresent(key));
        }
        let pod = Arc::new(pod);
        state.add_pod_to_node(Arc::clone(&pod), &self.generation_counter);
        state.pod_states.insert(key.clone(), PodState::new(pod));
        state.assumed_pods.insert(key);
        Ok(())
    }

    /// Mark an assumed pod's bind call as finished, starting its expiration
    /// countdown. A no-op if the pod is no longer assumed.
    pub fn finish_binding(&self, key: &PodKey) {
        self.finish_binding_at(key, Instant::now());
    }

    /// As [`SchedulerCache::finish_binding`], but with an injectable clock
    /// for deterministic tests.
    pub fn finish_binding_at(&self, key: &PodKey, now: Instant) {
        let mut state = self.lock();
        if state.assumed_pods.contains(key) {
            if let Some(pod_state) = state.pod_states.get_mut(key) {
                pod_state.deadline = Some(now + self.config.ttl);
                pod_state.binding_finished = true;
            }
        }
    }

    /// Undo an `assume` that will never be confirmed (e.g. the bind call failed).
    pub fn forget(&self, pod: &Pod) -> Result<(), CacheError> {
        let mut state = self.lock();
        let key = pod.key();

        let Some(pod_state) = state.pod_states.get(&key) else {
            return Err(CacheError::NotAssumed(key));
        };
        if !state.assumed_pods.contains(&key) {
            return Err(CacheError::NotAssumed(key));
        }
        if pod_state.pod.node_name() != pod.node_name() {
            return Err(CacheError::NodeMismatch {
                key,
                assumed_node: pod_state.pod.node_name().to_string(),
                given_node: pod.node_name().to_string(),
            });
        }

        let stored = Arc::clone(&pod_state.pod);
        state.remove_pod_from_node(&stored, &self.generation_counter)?;
        state.assumed_pods.remove(&key);
        state.pod_states.remove(&key);
        Ok(())
    }

    /// Confirm a pod's placement as observed by the event source.
    pub fn add(&self, pod: Pod) -> Result<(), CacheError> {
        let mut state = self.lock();
        let key = pod.key();

        if state.assumed_pods.contains(&key) {
            let recorded_node = state.pod_states[&key].pod.node_name().to_string();
            let pod = Arc::new(pod);
            if recorded_node == pod.node_name() {
                if let Some(node) = state.nodes.get_mut(&recorded_node) {
                    node.replace_pod_description(&key, Arc::clone(&pod));
                }
            } else {
                warn!(
                    pod = %key.name,
                    assumed_node = %recorded_node,
                    added_node = %pod.node_name(),
                    "pod was assumed on one node but added on another; trusting the watch"
                );
                let old_pod = Arc::clone(&state.pod_states[&key].pod);
                state.remove_pod_from_node(&old_pod, &self.generation_counter)?;
                state.add_pod_to_node(Arc::clone(&pod), &self.generation_counter);
            }
            state.assumed_pods.remove(&key);
            state.pod_states.insert(key, PodState::new(pod));
            return Ok(());
        }

        if state.pod_states.contains_key(&key) {
            return Err(CacheError::AlreadyAdded(key));
        }

        // Absent: recovery from an earlier expiry.
        let pod = Arc::new(pod);
        state.add_pod_to_node(Arc::clone(&pod), &self.generation_counter);
        state.pod_states.insert(key, PodState::new(pod));
        Ok(())
    }

    /// Apply an update to an already-Added pod, running the resize planner
    /// first when the new pod carries a resize-request annotation.
    pub fn update(&self, old_pod: &Pod, mut new_pod: Pod) -> Result<(), CacheError> {
        let mut state = self.lock();
        let key = old_pod.key();

        let Some(pod_state) = state.pod_states.get(&key) else {
            return Err(CacheError::NotAdded(key));
        };
        if state.assumed_pods.contains(&key) {
            return Err(CacheError::NotAdded(key));
        }
        if pod_state.pod.node_name() != new_pod.node_name() {
            error!(
                pod = %key.name,
                cached_node = %pod_state.pod.node_name(),
                event_node = %new_pod.node_name(),
                "scheduler cache observed a pod's node change on Update; this should be impossible"
            );
            panic!("scheduler cache is corrupted: pod {key:?} changed node on Update");
        }

        let stored_old = Arc::clone(&pod_state.pod);
        resize::plan_resize(
            &mut state.nodes,
            &self.generation_counter,
            &stored_old,
            &mut new_pod,
        )?;

        state.remove_pod_from_node(&stored_old, &self.generation_counter)?;
        let new_pod = Arc::new(new_pod);
        state.add_pod_to_node(Arc::clone(&new_pod), &self.generation_counter);
        state.pod_states.insert(key, PodState::new(new_pod));
        Ok(())
    }

    /// Remove an Added pod, e.g. because the event source reported it deleted.
    pub fn remove(&self, pod: &Pod) -> Result<(), CacheError> {
        let mut state = self.lock();
        let key = pod.key();

        let Some(pod_state) = state.pod_states.get(&key) else {
            return Err(CacheError::NotAdded(key));
        };
        if state.assumed_pods.contains(&key) {
            return Err(CacheError::NotAdded(key));
        }
        if pod_state.pod.node_name() != pod.node_name() {
            error!(
                pod = %key.name,
                cached_node = %pod_state.pod.node_name(),
                event_node = %pod.node_name(),
                "scheduler cache observed a pod's node change on Remove; this should be impossible"
            );
            panic!("scheduler cache is corrupted: pod {key:?} changed node on Remove");
        }

        let stored = Arc::clone(&pod_state.pod);
        state.remove_pod_from_node(&stored, &self.generation_counter)?;
        state.pod_states.remove(&key);
        Ok(())
    }

    pub fn add_node(&self, node: Node) {
        let mut state = self.lock();
        state
            .node_entry(&node.metadata.name.clone())
            .set_node(Arc::new(node), &self.generation_counter);
    }

    pub fn update_node(&self, node: Node) {
        self.add_node(node);
    }

    pub fn remove_node(&self, node_name: &str) {
        let mut state = self.lock();
        if let Some(info) = state.nodes.get_mut(node_name) {
            info.remove_node(&self.generation_counter);
            if info.is_empty() {
                state.nodes.remove(node_name);
            }
        }
    }

    pub fn add_pdb(&self, pdb: DisruptionBudget) {
        let mut state = self.lock();
        state.pdbs.insert(pdb.uid.clone(), Arc::new(pdb));
    }

    pub fn update_pdb(&self, pdb: DisruptionBudget) {
        self.add_pdb(pdb);
    }

    pub fn remove_pdb(&self, uid: &str) {
        self.lock().pdbs.remove(uid);
    }

    pub fn list_pdbs(&self, selector: &LabelSelector) -> Vec<Arc<DisruptionBudget>> {
        self.lock()
            .pdbs
            .values()
            .filter(|pdb| pdb.matches(selector))
            .cloned()
            .collect()
    }

    /// All pods matching `selector`, across every node.
    pub fn list(&self, selector: &LabelSelector) -> Vec<Arc<Pod>> {
        self.filtered_list(|_| true, selector)
    }

    /// All pods passing both `filter` and `selector`.
    pub fn filtered_list(
        &self,
        filter: impl Fn(&Pod) -> bool,
        selector: &LabelSelector,
    ) -> Vec<Arc<Pod>> {
        let state = self.lock();
        state
            .nodes
            .values()
            .flat_map(|info| info.pods())
            .filter(|pod| filter(pod) && selector.matches(&pod.metadata.labels))
            .cloned()
            .collect()
    }

    /// A deep-copied, fully detached view of the cache. Expensive; avoid on
    /// the scheduling hot path.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            nodes: state.nodes.clone(),
            assumed_pods: state.assumed_pods.clone(),
            pdbs: state.pdbs.clone(),
        }
    }

    /// Incrementally refresh a caller-owned node map: overwrite stale or
    /// missing entries, drop entries the cache no longer has.
    pub fn update_node_name_to_info_map(&self, into: &mut HashMap<String, NodeInfo>) {
        let state = self.lock();
        for (name, info) in &state.nodes {
            let stale = into
                .get(name)
                .map(|current| current.generation() != info.generation())
                .unwrap_or(true);
            if stale {
                into.insert(name.clone(), info.clone());
            }
        }
        into.retain(|name, _| state.nodes.contains_key(name));
    }

    /// Whether `generation` (as observed by a caller holding a prior clone of
    /// the node's `NodeInfo`) is still current.
    pub fn is_up_to_date(&self, node_name: &str, generation: u64) -> bool {
        self.lock()
            .nodes
            .get(node_name)
            .map(|info| info.generation() == generation)
            .unwrap_or(false)
    }

    /// Run one expiration sweep using the current time. Exposed for the
    /// background loop in [`crate::expiration`] and for deterministic tests.
    pub fn run_expiration_sweep_at(&self, now: Instant) {
        let mut state = self.lock();
        let mut expired = Vec::new();
        for key in state.assumed_pods.iter() {
            let Some(pod_state) = state.pod_states.get(key) else {
                error!(pod = %key.name, "assumed-pod invariant violated: key missing from pod states");
                panic!("scheduler cache is corrupted: {key:?} is assumed but has no pod state");
            };
            if !pod_state.binding_finished {
                continue;
            }
            if matches!(pod_state.deadline, Some(deadline) if now > deadline) {
                expired.push(key.clone());
            }
        }

        for key in expired {
            let pod = Arc::clone(&state.pod_states[&key].pod);
            if let Err(err) = state.remove_pod_from_node(&pod, &self.generation_counter) {
                warn!(pod = %key.name, error = %err, "failed to remove expired pod from its node");
            }
            state.assumed_pods.remove(&key);
            state.pod_states.remove(&key);
        }
    }
}
