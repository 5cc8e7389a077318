//! An in-memory scheduler cache: the authoritative record of where pods are
//! placed, built for a scheduler that must never block on a slow API call
//! while holding the lock that answers "is this node free?"

pub mod cache;
pub mod config;
pub mod error;
pub mod expiration;
pub mod node;
pub mod node_info;
pub mod pdb;
pub mod pod;
pub mod pod_state;
pub mod resize;
pub mod resource;
pub mod selector;
pub mod snapshot;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub use cache::SchedulerCache;
pub use config::CacheConfig;
pub use error::CacheError;

/// Owns a [`SchedulerCache`] plus the background expiration sweep that keeps
/// it honest. This is the handle a scheduler binary constructs once at
/// startup and clones into every component that needs cache access.
pub struct CacheHandle {
    pub cache: SchedulerCache,
    shutdown_tx: watch::Sender<bool>,
    sweep_task: Option<JoinHandle<()>>,
}

impl CacheHandle {
    /// Construct the cache and start its background expiration sweep.
    pub fn start(config: CacheConfig) -> Self {
        let cache = SchedulerCache::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep_task = expiration::spawn_expiration_loop(cache.clone(), shutdown_rx);
        info!("scheduler cache started");
        Self {
            cache,
            shutdown_tx,
            sweep_task: Some(sweep_task),
        }
    }

    /// Signal the background sweep to stop and wait for it to exit.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.sweep_task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "expiration sweep task panicked");
            }
        }
        info!("scheduler cache stopped");
    }
}
