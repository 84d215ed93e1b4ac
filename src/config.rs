//! Configuration Module
//!
//! Handles loading the service tunables from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string for the durable store
    pub database_url: Option<String>,
    /// Redis connection string for the shared cache
    pub redis_url: Option<String>,
    /// Maximum pooled database connections
    pub db_max_connections: u32,
    /// Base TTL in seconds for cached post details
    pub detail_cache_ttl: u64,
    /// Upper bound in seconds of the random jitter added to the detail TTL
    pub detail_cache_jitter: u64,
    /// TTL in seconds for "confirmed absent" tombstones
    pub tombstone_ttl: u64,
    /// TTL in seconds for per-user feed timelines
    pub feed_ttl: u64,
    /// Number of recent posts pushed when seeding a timeline
    pub feed_seed_limit: usize,
    /// Largest page size served by the feed
    pub feed_max_page_size: usize,
    /// Rebuild a cold timeline in the background after a pull read
    pub feed_seed_on_pull: bool,
    /// Score added to a post when it is liked
    pub like_post_weight: f64,
    /// Score added to a comment's parent post when the comment is liked
    pub like_comment_weight: f64,
    /// Score added to a post when it receives a comment
    pub comment_weight: f64,
    /// Number of background workers
    pub worker_count: usize,
    /// Capacity of the background job queue
    pub worker_queue_capacity: usize,
    /// Timeout in seconds applied to each background job
    pub job_timeout: u64,
    /// In-memory cache cleanup interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` / `REDIS_URL` - backend connection strings (default: unset)
    /// - `DB_MAX_CONNECTIONS` - pool size (default: 10)
    /// - `DETAIL_CACHE_TTL` - post detail TTL in seconds (default: 1800)
    /// - `DETAIL_CACHE_JITTER` - max TTL jitter in seconds (default: 300)
    /// - `TOMBSTONE_TTL` - negative cache TTL in seconds (default: 60)
    /// - `FEED_TTL` - timeline TTL in seconds (default: 604800)
    /// - `FEED_SEED_LIMIT` - posts pushed on follow (default: 100)
    /// - `FEED_MAX_PAGE_SIZE` - page size clamp (default: 100)
    /// - `FEED_SEED_ON_PULL` - seed cold timelines after pull reads (default: true)
    /// - `LIKE_POST_WEIGHT` / `LIKE_COMMENT_WEIGHT` / `COMMENT_WEIGHT` - score deltas (default: 10/5/5)
    /// - `WORKER_COUNT` - background workers (default: 4)
    /// - `WORKER_QUEUE_CAPACITY` - background queue size (default: 1024)
    /// - `JOB_TIMEOUT` - background job timeout in seconds (default: 10)
    /// - `CLEANUP_INTERVAL` - in-memory cache sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            detail_cache_ttl: env_or("DETAIL_CACHE_TTL", defaults.detail_cache_ttl),
            detail_cache_jitter: env_or("DETAIL_CACHE_JITTER", defaults.detail_cache_jitter),
            tombstone_ttl: env_or("TOMBSTONE_TTL", defaults.tombstone_ttl),
            feed_ttl: env_or("FEED_TTL", defaults.feed_ttl),
            feed_seed_limit: env_or("FEED_SEED_LIMIT", defaults.feed_seed_limit),
            feed_max_page_size: env_or("FEED_MAX_PAGE_SIZE", defaults.feed_max_page_size),
            feed_seed_on_pull: env_or("FEED_SEED_ON_PULL", defaults.feed_seed_on_pull),
            like_post_weight: env_or("LIKE_POST_WEIGHT", defaults.like_post_weight),
            like_comment_weight: env_or("LIKE_COMMENT_WEIGHT", defaults.like_comment_weight),
            comment_weight: env_or("COMMENT_WEIGHT", defaults.comment_weight),
            worker_count: env_or("WORKER_COUNT", defaults.worker_count),
            worker_queue_capacity: env_or("WORKER_QUEUE_CAPACITY", defaults.worker_queue_capacity),
            job_timeout: env_or("JOB_TIMEOUT", defaults.job_timeout),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// Background job timeout as a Duration.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout)
    }

    /// In-memory cache sweep interval as a Duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            db_max_connections: 10,
            detail_cache_ttl: 30 * 60,
            detail_cache_jitter: 300,
            tombstone_ttl: 60,
            feed_ttl: 7 * 24 * 60 * 60,
            feed_seed_limit: 100,
            feed_max_page_size: 100,
            feed_seed_on_pull: true,
            like_post_weight: 10.0,
            like_comment_weight: 5.0,
            comment_weight: 5.0,
            worker_count: 4,
            worker_queue_capacity: 1024,
            job_timeout: 10,
            cleanup_interval: 1,
        }
    }
}
