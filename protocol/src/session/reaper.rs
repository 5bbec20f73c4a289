//! Background reclamation of expired sessions.
//!
//! Validation already evicts expired sessions lazily, but a user who logs
//! in once and never comes back would otherwise stay in memory forever.
//! The reaper bounds that growth by sweeping the store on a fixed interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::store::CredentialStore;

/// Shortest sweep interval; shorter requests are raised to this.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns a task that calls [`CredentialStore::reclaim_expired`] every
/// `every`. The first sweep happens one full interval after spawning.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. Must be called from inside a tokio runtime.
pub fn spawn_reaper(store: Arc<CredentialStore>, every: Duration) -> JoinHandle<()> {
    spawn_reaper_with(store, every, |_, _| {})
}

/// Like [`spawn_reaper`], but calls `on_sweep(reclaimed, live)` after every
/// sweep so the caller can feed its own counters.
///
/// An `every` below one millisecond (zero included) is treated as one
/// millisecond.
pub fn spawn_reaper_with<F>(store: Arc<CredentialStore>, every: Duration, on_sweep: F) -> JoinHandle<()>
where
    F: Fn(usize, usize) + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let reclaimed = store.reclaim_expired();
            let live = store.len();
            if reclaimed > 0 {
                tracing::info!(reclaimed, live, "reaped expired sessions");
            } else {
                tracing::trace!(live, "reaper sweep found nothing to reclaim");
            }
            on_sweep(reclaimed, live);
        }
    })
}
