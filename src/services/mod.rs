//! Services Module
//!
//! The engagement-ranking and feed-distribution operations, wired together
//! in `AppState`.
//!
//! # Services
//! - `PostDetailCache`: cache-aside post reads with load coalescing
//! - `FeedDistributor`: push/pull timelines
//! - `EngagementScorer`: like toggles and comments with hot score updates
//! - `NotificationDispatcher`: best-effort notifications
//! - `PostService` / `RelationService`: post lifecycle and follow edges

mod engagement;
mod feed;
mod notification;
mod post_detail;
mod posts;
mod relations;


use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::cache::{MemoryCache, RedisCache, SharedCache};
use crate::config::Config;
use crate::store::{
    CommentStore, EngagementStore, LikeStore, MemoryStore, NotificationStore, PgStore, PostStore,
    RelationStore,
};
use crate::tasks::BackgroundPool;

pub use engagement::EngagementScorer;
pub use feed::FeedDistributor;
pub use notification::{NotificationDispatcher, SYSTEM_ACTOR};
pub use post_detail::PostDetailCache;
pub use posts::{PostService, MAX_LEADERBOARD, MAX_TITLE_CHARS};
pub use relations::RelationService;

// == Backends ==
/// Store and cache handles injected into every service.
#[derive(Clone)]
pub struct Backends {
    pub posts: Arc<dyn PostStore>,
    pub likes: Arc<dyn LikeStore>,
    pub comments: Arc<dyn CommentStore>,
    pub relations: Arc<dyn RelationStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub engagement: Arc<dyn EngagementStore>,
    pub cache: Arc<dyn SharedCache>,
}

impl Backends {
    /// In-process backends. The caller keeps its own handles to inspect them.
    pub fn memory(store: &MemoryStore, cache: &MemoryCache) -> Self {
        let store = Arc::new(store.clone());
        Self {
            posts: store.clone(),
            likes: store.clone(),
            comments: store.clone(),
            relations: store.clone(),
            notifications: store.clone(),
            engagement: store,
            cache: Arc::new(cache.clone()),
        }
    }

    /// PostgreSQL and Redis backends from `DATABASE_URL` / `REDIS_URL`.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is not set")?;
        let redis_url = config.redis_url.as_deref().context("REDIS_URL is not set")?;

        let store = Arc::new(PgStore::connect(database_url, config.db_max_connections).await?);
        let cache = RedisCache::connect(redis_url).await?;
        info!("connected to postgres and redis");

        Ok(Self {
            posts: store.clone(),
            likes: store.clone(),
            comments: store.clone(),
            relations: store.clone(),
            notifications: store.clone(),
            engagement: store,
            cache: Arc::new(cache),
        })
    }
}

// == Application State ==
/// Every service, sharing one background pool.
#[derive(Clone)]
pub struct AppState {
    pub pool: BackgroundPool,
    pub details: PostDetailCache,
    pub feed: FeedDistributor,
    pub engagement: EngagementScorer,
    pub notifications: NotificationDispatcher,
    pub posts: PostService,
    pub relations: RelationService,
}

impl AppState {
    /// Wires the services over `backends`. Must be called inside a tokio runtime.
    pub fn new(backends: Backends, config: &Config) -> Self {
        let pool = BackgroundPool::new(
            config.worker_count,
            config.worker_queue_capacity,
            config.job_timeout(),
        );
        let details = PostDetailCache::new(
            backends.posts.clone(),
            backends.likes.clone(),
            backends.cache.clone(),
            config,
        );
        let feed = FeedDistributor::new(
            backends.posts.clone(),
            backends.relations.clone(),
            backends.cache.clone(),
            pool.clone(),
            config,
        );
        let notifications = NotificationDispatcher::new(backends.notifications.clone(), pool.clone());
        let engagement = EngagementScorer::new(
            backends.posts.clone(),
            backends.comments.clone(),
            backends.engagement.clone(),
            details.clone(),
            notifications.clone(),
            config,
        );
        let posts = PostService::new(backends.posts.clone(), details.clone(), feed.clone());
        let relations = RelationService::new(backends.relations, feed.clone(), notifications.clone());

        Self {
            pool,
            details,
            feed,
            engagement,
            notifications,
            posts,
            relations,
        }
    }

    /// Lets queued background work finish for up to `grace`, then stops the pool.
    pub async fn shutdown(&self, grace: Duration) {
        self.pool.shutdown(grace).await;
    }
}

#[cfg(test)]
use crate::models::{NewPost, PostKind, PostStatus, UserId};

/// Post fixture shared by the service unit tests.
#[cfg(test)]
pub(crate) fn draft(author_id: UserId, status: PostStatus) -> NewPost {
    NewPost {
        author_id,
        title: format!("post by {}", author_id),
        content: "content".to_string(),
        kind: PostKind::Article,
        status,
    }
}
