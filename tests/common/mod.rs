//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use hotfeed::cache::MemoryCache;
use hotfeed::models::{Post, PostKind, PostStatus, UserId};
use hotfeed::store::MemoryStore;
use hotfeed::{AppState, Backends, Config};

pub struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    pub cache: MemoryCache,
    pub config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), Config::default())
    }

    pub fn with_store(store: MemoryStore, config: Config) -> Self {
        let cache = MemoryCache::new();
        let state = AppState::new(Backends::memory(&store, &cache), &config);
        Self {
            state,
            store,
            cache,
            config,
        }
    }

    /// Publishes a post through the service, so fan-out runs as in production.
    pub async fn publish(&self, author_id: UserId, title: &str) -> Post {
        self.state
            .posts
            .create_post(author_id, title, "body", PostKind::Article, PostStatus::Published)
            .await
            .unwrap()
    }

    /// Waits for queued fan-out and notification jobs.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.state.pool.wait_idle())
            .await
            .expect("background jobs did not finish");
    }
}
