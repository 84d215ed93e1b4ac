//! In-process shared cache
//!
//! Wraps a `CacheStore` in `Arc<RwLock<..>>` the same way the cleanup task
//! expects it. Lock guards are released before every return, so no caller
//! ever holds them across its own awaits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::{CacheStore, SharedCache};
use crate::error::{CacheError, CacheResult};
use crate::tasks::spawn_cleanup_task;

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    store: Arc<RwLock<CacheStore>>,
    offline: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the underlying store, for the cleanup task.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        self.store.clone()
    }

    /// Starts the background sweep of expired entries. Abort the handle to stop it.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        spawn_cleanup_task(self.store(), interval)
    }

    /// Simulates an outage: every call fails until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> CacheResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_online()?;
        // Write lock: expired entries are removed on access
        self.store.write().await.get(key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check_online()?;
        self.store.write().await.set(key, value, ttl)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_online()?;
        self.store.write().await.delete(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> CacheResult<()> {
        self.check_online()?;
        self.store.write().await.zadd(key, members)
    }

    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>> {
        self.check_online()?;
        self.store.write().await.zrevrange(key, start, stop)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.check_online()?;
        self.store.write().await.expire(key, ttl);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_state() {
        let cache = MemoryCache::new();
        let other = cache.clone();

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(other.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_offline_cache_fails_every_call() {
        let cache = MemoryCache::new();
        cache.set_offline(true);

        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.zrevrange("feed", 0, 1).await.is_err());

        cache.set_offline(false);
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
