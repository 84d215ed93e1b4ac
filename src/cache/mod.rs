//! Shared Cache Module
//!
//! The `SharedCache` trait is the only view the services have of the
//! key-value tier. Two backends implement it:
//! - `MemoryCache`: in-process TTL store (strings and sorted sets)
//! - `RedisCache`: Redis through a multiplexed `ConnectionManager`
//!
//! The cache is never authoritative. Every value under these keys can be
//! rebuilt from the durable store.

mod entry;
mod memory;
mod redis;
mod store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::models::{PostId, UserId};

// Re-export public types
pub use self::redis::RedisCache;
pub use entry::{CacheEntry, CacheValue};
pub use memory::MemoryCache;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Cached value meaning "confirmed absent", distinct from a missing key
pub const TOMBSTONE: &str = "NULL";

/// Key of the cached detail view of a post.
pub fn post_detail_key(post_id: PostId) -> String {
    format!("post:detail:{}", post_id)
}

/// Key of a user's timeline sorted set.
pub fn feed_key(user_id: UserId) -> String {
    format!("feed:user:{}", user_id)
}

// == Shared Cache ==
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// String value under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores a string value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Adds `(member, score)` pairs to the sorted set under `key`.
    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> CacheResult<()>;

    /// Members ranked `start..=stop` by descending score.
    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>>;

    /// Refreshes the TTL of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;
}
