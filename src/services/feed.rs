//! Feed Distributor
//!
//! Hybrid push/pull timelines. Each user's timeline is a sorted set of post
//! ids scored by creation time, pushed on publish and seeded on follow. Reads
//! page through the sorted set and resolve ids against the durable store;
//! a cold or unreachable timeline falls back to pulling followees' posts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cache::{feed_key, SharedCache};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Post, PostId, UserId};
use crate::store::{PostStore, RelationStore};
use crate::tasks::BackgroundPool;

#[derive(Clone)]
pub struct FeedDistributor {
    posts: Arc<dyn PostStore>,
    relations: Arc<dyn RelationStore>,
    cache: Arc<dyn SharedCache>,
    pool: BackgroundPool,
    feed_ttl: Duration,
    seed_limit: usize,
    max_page_size: usize,
    seed_on_pull: bool,
}

impl FeedDistributor {
    pub fn new(
        posts: Arc<dyn PostStore>,
        relations: Arc<dyn RelationStore>,
        cache: Arc<dyn SharedCache>,
        pool: BackgroundPool,
        config: &Config,
    ) -> Self {
        Self {
            posts,
            relations,
            cache,
            pool,
            feed_ttl: Duration::from_secs(config.feed_ttl),
            seed_limit: config.feed_seed_limit,
            max_page_size: config.feed_max_page_size.max(1),
            seed_on_pull: config.feed_seed_on_pull,
        }
    }

    // == Get Feed ==
    /// One page of the user's timeline, newest first. `page` starts at 1.
    pub async fn get_feed(&self, user_id: UserId, page: usize, page_size: usize) -> Result<Vec<Post>> {
        if user_id <= 0 {
            return Err(AppError::Validation("user id must be positive".to_string()));
        }
        if page < 1 || page_size < 1 {
            return Err(AppError::Validation(
                "page and page size must be at least 1".to_string(),
            ));
        }

        let size = page_size.min(self.max_page_size);
        let start = (page - 1).saturating_mul(size);
        let stop = start.saturating_add(size - 1);

        match self.cache.zrevrange(&feed_key(user_id), start, stop).await {
            Ok(members) if !members.is_empty() => return self.resolve(user_id, &members).await,
            Ok(_) => debug!(user_id, page, "timeline cold, pulling from followees"),
            Err(err) => warn!(user_id, error = %err, "timeline read failed, pulling from followees"),
        }

        let posts = self.pull(user_id, start, size).await?;
        if self.seed_on_pull && page == 1 && !posts.is_empty() {
            self.schedule_rebuild(user_id);
        }
        Ok(posts)
    }

    /// Resolves cached ids to posts in cache order, dropping any that are no
    /// longer published.
    async fn resolve(&self, user_id: UserId, members: &[String]) -> Result<Vec<Post>> {
        let ids: Vec<PostId> = members
            .iter()
            .filter_map(|member| match member.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(user_id, member = %member, "skipping malformed timeline member");
                    None
                }
            })
            .collect();

        let found = self.posts.find_by_ids(&ids).await.map_err(|err| {
            error!(user_id, error = %err, "failed to resolve timeline posts");
            AppError::server()
        })?;
        let mut by_id: HashMap<PostId, Post> = found.into_iter().map(|p| (p.id, p)).collect();

        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .filter(Post::is_published)
            .collect())
    }

    async fn pull(&self, user_id: UserId, offset: usize, limit: usize) -> Result<Vec<Post>> {
        let followees = self.relations.followee_ids(user_id).await.map_err(|err| {
            error!(user_id, error = %err, "failed to load followees");
            AppError::server()
        })?;
        if followees.is_empty() {
            return Ok(Vec::new());
        }
        self.posts
            .list_published_by_authors(&followees, offset, limit)
            .await
            .map_err(|err| {
                error!(user_id, error = %err, "failed to pull followee posts");
                AppError::server()
            })
    }

    // == Rebuild ==
    /// Background rebuild of a cold timeline from all followees' recent posts.
    fn schedule_rebuild(&self, user_id: UserId) {
        let this = self.clone();
        self.pool.submit("feed_rebuild", async move {
            let followees = match this.relations.followee_ids(user_id).await {
                Ok(ids) if !ids.is_empty() => ids,
                Ok(_) => return,
                Err(err) => {
                    warn!(user_id, error = %err, "timeline rebuild: failed to load followees");
                    return;
                }
            };
            match this
                .posts
                .list_published_by_authors(&followees, 0, this.seed_limit)
                .await
            {
                Ok(posts) => {
                    if this.push_to_timeline(user_id, &posts).await {
                        info!(user_id, posts = posts.len(), "timeline rebuilt");
                    }
                }
                Err(err) => warn!(user_id, error = %err, "timeline rebuild: failed to load posts"),
            }
        });
    }

    // == On Follow ==
    /// Seeds the follower's timeline with the followee's recent posts.
    pub fn on_follow(&self, follower_id: UserId, followee_id: UserId) {
        let this = self.clone();
        self.pool.submit("feed_seed", async move {
            let posts = match this
                .posts
                .list_by_author_recent(followee_id, this.seed_limit)
                .await
            {
                Ok(posts) => posts,
                Err(err) => {
                    warn!(follower_id, followee_id, error = %err, "timeline seed: failed to load posts");
                    return;
                }
            };
            if this.push_to_timeline(follower_id, &posts).await {
                debug!(follower_id, followee_id, posts = posts.len(), "timeline seeded");
            }
        });
    }

    // == On Publish ==
    /// Pushes a newly published post onto every follower's timeline.
    pub fn on_publish(&self, post: &Post) {
        if !post.is_published() {
            debug!(post_id = post.id, "skipping fan-out of unpublished post");
            return;
        }
        let this = self.clone();
        let post = post.clone();
        self.pool.submit("feed_fanout", async move {
            let followers = match this.relations.follower_ids(post.author_id).await {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(post_id = post.id, error = %err, "fan-out: failed to load followers");
                    return;
                }
            };
            let slice = std::slice::from_ref(&post);
            let mut delivered = 0;
            for follower_id in &followers {
                if this.push_to_timeline(*follower_id, slice).await {
                    delivered += 1;
                }
            }
            debug!(post_id = post.id, followers = followers.len(), delivered, "fan-out finished");
        });
    }

    /// Adds posts to one timeline and refreshes its TTL. Returns false on any
    /// cache failure, which is logged here.
    async fn push_to_timeline(&self, user_id: UserId, posts: &[Post]) -> bool {
        if posts.is_empty() {
            return true;
        }
        let key = feed_key(user_id);
        let members: Vec<(String, f64)> = posts
            .iter()
            .map(|p| (p.id.to_string(), p.feed_score()))
            .collect();

        if let Err(err) = self.cache.zadd(&key, &members).await {
            warn!(user_id, error = %err, "failed to push to timeline");
            return false;
        }
        if let Err(err) = self.cache.expire(&key, self.feed_ttl).await {
            warn!(user_id, error = %err, "failed to refresh timeline ttl");
            return false;
        }
        true
    }
}
