//! Post Detail Cache
//!
//! Cache-aside read path for single posts.
//!
//! # Read flow
//! 1. Shared cache hit: a tombstone reads as not found, anything else is
//!    decoded and returned.
//! 2. Miss: concurrent callers for the same post share one load. The first
//!    caller registers a broadcast channel in the in-flight map and spawns the
//!    load as its own task; later callers subscribe to that channel.
//! 3. The load writes the composed view back with a jittered TTL, or a short
//!    lived tombstone when the post is absent.
//!
//! Writers never update cached views in place; they call `invalidate`, which
//! also detaches any load already in flight. A detached load still answers the
//! callers that joined it but never writes its result back, so a read that
//! began before a commit cannot repopulate the cache with pre-commit data.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::cache::{post_detail_key, SharedCache, TOMBSTONE};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{PostDetailView, PostId, TargetKind};
use crate::store::{LikeStore, PostStore};

type LoadResult = std::result::Result<Arc<PostDetailView>, AppError>;

#[derive(Clone)]
pub struct PostDetailCache {
    inner: Arc<DetailInner>,
}

struct DetailInner {
    posts: Arc<dyn PostStore>,
    likes: Arc<dyn LikeStore>,
    cache: Arc<dyn SharedCache>,
    in_flight: DashMap<PostId, InFlight>,
    next_load_id: AtomicU64,
    ttl: Duration,
    jitter_secs: u64,
    tombstone_ttl: Duration,
}

/// A registered load, shared between the map entry and the loading task.
#[derive(Clone)]
struct InFlight {
    load_id: u64,
    sender: broadcast::Sender<LoadResult>,
    /// Set by `invalidate`; the result must not reach the shared cache
    stale: Arc<AtomicBool>,
}

/// Removes this load's in-flight entry when the load ends, including by
/// panic. A newer load registered after an invalidation is left alone.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<PostId, InFlight>,
    post_id: PostId,
    load_id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.post_id, |_, flight| flight.load_id == self.load_id);
    }
}

impl PostDetailCache {
    pub fn new(
        posts: Arc<dyn PostStore>,
        likes: Arc<dyn LikeStore>,
        cache: Arc<dyn SharedCache>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(DetailInner {
                posts,
                likes,
                cache,
                in_flight: DashMap::new(),
                next_load_id: AtomicU64::new(0),
                ttl: Duration::from_secs(config.detail_cache_ttl),
                jitter_secs: config.detail_cache_jitter,
                tombstone_ttl: Duration::from_secs(config.tombstone_ttl),
            }),
        }
    }

    // == Get Post Detail ==
    pub async fn get_post_detail(&self, post_id: PostId) -> Result<PostDetailView> {
        if post_id <= 0 {
            return Err(AppError::Validation("post id must be positive".to_string()));
        }

        let key = post_detail_key(post_id);
        match self.inner.cache.get(&key).await {
            Ok(Some(raw)) if raw == TOMBSTONE => {
                debug!(post_id, "post detail tombstone hit");
                return Err(not_found(post_id));
            }
            Ok(Some(raw)) => match serde_json::from_str::<PostDetailView>(&raw) {
                Ok(view) => return Ok(view),
                Err(err) => warn!(post_id, error = %err, "undecodable cached post detail, reloading"),
            },
            Ok(None) => {}
            Err(err) => warn!(post_id, error = %err, "post detail cache read failed, reading store"),
        }

        let view = self.load_shared(post_id).await?;
        Ok(view.as_ref().clone())
    }

    // == Invalidate ==
    /// Drops the cached view and detaches any in-flight load, so later readers
    /// start a fresh one. Cache failures are logged; the entry then ages out by TTL.
    pub async fn invalidate(&self, post_id: PostId) {
        if let Some((_, flight)) = self.inner.in_flight.remove(&post_id) {
            flight.stale.store(true, Ordering::SeqCst);
            debug!(post_id, "detached in-flight post detail load");
        }

        let key = post_detail_key(post_id);
        if let Err(err) = self.inner.cache.delete(&key).await {
            warn!(post_id, error = %err, "failed to invalidate post detail");
        }
    }

    /// Number of loads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    async fn load_shared(&self, post_id: PostId) -> Result<Arc<PostDetailView>> {
        let (mut receiver, leader) = match self.inner.in_flight.entry(post_id) {
            Entry::Occupied(entry) => (entry.get().sender.subscribe(), None),
            Entry::Vacant(entry) => {
                let (sender, receiver) = broadcast::channel(1);
                let flight = InFlight {
                    load_id: self.inner.next_load_id.fetch_add(1, Ordering::Relaxed),
                    sender,
                    stale: Arc::new(AtomicBool::new(false)),
                };
                entry.insert(flight.clone());
                (receiver, Some(flight))
            }
        };

        match leader {
            Some(flight) => {
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.run_load(post_id, flight).await });
            }
            None => debug!(post_id, "joining in-flight post detail load"),
        }

        match receiver.recv().await {
            Ok(result) => result,
            Err(err) => {
                error!(post_id, error = %err, "post detail load ended without a result");
                Err(AppError::server())
            }
        }
    }
}

impl DetailInner {
    async fn run_load(&self, post_id: PostId, flight: InFlight) {
        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            post_id,
            load_id: flight.load_id,
        };

        let result = self.load(post_id, &flight.stale).await.map(Arc::new);

        // Unregister before publishing so no caller subscribes after the send
        drop(guard);
        // No receivers left only if every caller was cancelled
        let _ = flight.sender.send(result);
    }

    async fn load(&self, post_id: PostId, stale: &AtomicBool) -> Result<PostDetailView> {
        let key = post_detail_key(post_id);

        let post = self.posts.find_by_id(post_id).await.map_err(|err| {
            error!(post_id, error = %err, "failed to load post");
            AppError::server()
        })?;

        let Some(post) = post else {
            self.write_back(post_id, &key, TOMBSTONE, self.tombstone_ttl, stale)
                .await;
            return Err(not_found(post_id));
        };

        let like_count = self
            .likes
            .count(post_id, TargetKind::Post)
            .await
            .map_err(|err| {
                error!(post_id, error = %err, "failed to count post likes");
                AppError::server()
            })?;

        let view = PostDetailView { post, like_count };
        match serde_json::to_string(&view) {
            Ok(raw) => {
                self.write_back(post_id, &key, &raw, self.detail_ttl(), stale)
                    .await
            }
            Err(err) => warn!(post_id, error = %err, "failed to encode post detail"),
        }
        Ok(view)
    }

    /// Caches a loaded value unless the load was detached. The flag is checked
    /// again after the write because `invalidate` may run in between; its own
    /// delete can then land before our set.
    async fn write_back(
        &self,
        post_id: PostId,
        key: &str,
        value: &str,
        ttl: Duration,
        stale: &AtomicBool,
    ) {
        if stale.load(Ordering::SeqCst) {
            debug!(post_id, "skipping write-back of detached post detail load");
            return;
        }
        if let Err(err) = self.cache.set(key, value, ttl).await {
            warn!(post_id, error = %err, "failed to cache post detail");
            return;
        }
        if stale.load(Ordering::SeqCst) {
            if let Err(err) = self.cache.delete(key).await {
                warn!(post_id, error = %err, "failed to drop detached post detail");
            }
        }
    }

    /// Base TTL plus uniform jitter, so entries filled together expire apart.
    fn detail_ttl(&self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=self.jitter_secs);
        self.ttl + Duration::from_secs(jitter)
    }
}

fn not_found(post_id: PostId) -> AppError {
    AppError::NotFound(format!("post {}", post_id))
}
