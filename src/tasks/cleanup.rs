//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of the
//! in-process cache. `MemoryCache` only expires lazily on access, so keys
//! that are never read again (stale timelines, old tombstones) would
//! otherwise stay resident.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns the sweep loop over `cache`, one pass every `interval`.
///
/// The returned handle is the only way to stop the loop; abort it on
/// shutdown.
pub fn spawn_cleanup_task(cache: Arc<RwLock<CacheStore>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "starting cache cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let (removed, remaining) = {
                let mut store = cache.write().await;
                let removed = store.cleanup_expired();
                (removed, store.len())
            };

            if removed > 0 {
                info!(removed, remaining, "cache cleanup removed expired entries");
            } else {
                debug!(remaining, "cache cleanup found no expired entries");
            }
        }
    })
}
