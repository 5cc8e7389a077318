//! Background task that evicts assumed pods whose bind confirmation never arrived.
//!
//! A `tokio::spawn`'d loop driven by `tokio::time::interval`, stopped by a
//! `tokio::sync::watch::Receiver<bool>` shutdown signal rather than an
//! `AbortHandle`, so the caller controls shutdown explicitly instead of
//! relying on the task's drop behavior.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SchedulerCache;

/// Spawn the expiration sweep as a background task. Dropping the returned
/// handle does not stop the task; send `true` on the paired shutdown sender
/// (or drop it) to stop it.
pub fn spawn_expiration_loop(
    cache: SchedulerCache,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = cache.config().sweep_period;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        info!(period_ms = period.as_millis() as u64, "expiration sweep started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("running expiration sweep");
                    cache.run_expiration_sweep_at(std::time::Instant::now());
                }
                changed = shutdown.changed() => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => break,
                        Ok(()) => continue,
                        Err(_) => break,
                    }
                }
            }
        }
        info!("expiration sweep stopped");
    })
}
