//! Post lifecycle
//!
//! Create, publish, edit and soft-delete posts, plus the hot score
//! leaderboard. Every mutation invalidates the post's cached detail before
//! returning, and a post that becomes published is fanned out to followers.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::models::{NewPost, Post, PostId, PostKind, PostStatus, UserId};
use crate::services::{FeedDistributor, PostDetailCache};
use crate::store::PostStore;

/// Longest accepted title, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

/// Largest leaderboard page.
pub const MAX_LEADERBOARD: usize = 100;

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    details: PostDetailCache,
    feed: FeedDistributor,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, details: PostDetailCache, feed: FeedDistributor) -> Self {
        Self {
            posts,
            details,
            feed,
        }
    }

    // == Create ==
    pub async fn create_post(
        &self,
        author_id: UserId,
        title: &str,
        content: &str,
        kind: PostKind,
        status: PostStatus,
    ) -> Result<Post> {
        if author_id <= 0 {
            return Err(AppError::Validation("author id must be positive".to_string()));
        }
        validate_body(title, content)?;
        if status == PostStatus::Deleted {
            return Err(AppError::Validation(
                "a new post must be a draft or published".to_string(),
            ));
        }

        let post = self
            .posts
            .create(NewPost {
                author_id,
                title: title.to_string(),
                content: content.to_string(),
                kind,
                status,
            })
            .await
            .map_err(|err| {
                error!(author_id, error = %err, "failed to create post");
                AppError::server()
            })?;

        // A read of this id before it existed may have left a tombstone
        self.details.invalidate(post.id).await;
        info!(post_id = post.id, author_id, ?status, "post created");
        self.feed.on_publish(&post);
        Ok(post)
    }

    // == Publish ==
    /// Moves an owned draft to published.
    pub async fn publish_post(&self, post_id: PostId, author_id: UserId) -> Result<Post> {
        let mut post = self.owned_post(post_id, author_id).await?;
        if post.status != PostStatus::Draft {
            return Err(AppError::Validation(format!("post {} is not a draft", post_id)));
        }

        self.set_status(post_id, PostStatus::Published).await?;
        post.status = PostStatus::Published;
        self.feed.on_publish(&post);

        info!(post_id, author_id, "post published");
        Ok(post)
    }

    // == Update ==
    /// Rewrites title and content, optionally moving between draft and
    /// published. A draft that becomes published is fanned out.
    pub async fn update_post(
        &self,
        post_id: PostId,
        author_id: UserId,
        title: &str,
        content: &str,
        status: PostStatus,
    ) -> Result<Post> {
        validate_body(title, content)?;
        if status == PostStatus::Deleted {
            return Err(AppError::Validation(
                "use delete to remove a post".to_string(),
            ));
        }
        let mut post = self.owned_post(post_id, author_id).await?;

        let result = self
            .posts
            .update_content(post_id, title, content, status)
            .await;
        // An error may still have reached the row, so the view goes either way
        self.details.invalidate(post_id).await;
        let updated = result.map_err(|err| {
            error!(post_id, error = %err, "failed to update post");
            AppError::server()
        })?;
        if !updated {
            return Err(not_found(post_id));
        }

        let previous = post.status;
        post.title = title.to_string();
        post.content = content.to_string();
        post.status = status;

        if previous == PostStatus::Draft && status == PostStatus::Published {
            self.feed.on_publish(&post);
        }
        Ok(post)
    }

    // == Delete ==
    /// Soft delete: the row stays, every read path stops seeing it.
    pub async fn delete_post(&self, post_id: PostId, author_id: UserId) -> Result<()> {
        self.owned_post(post_id, author_id).await?;
        self.set_status(post_id, PostStatus::Deleted).await?;

        info!(post_id, author_id, "post deleted");
        Ok(())
    }

    // == Leaderboard ==
    /// Published posts by hot score, highest first. `limit` is clamped to 1..=100.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Post>> {
        let limit = limit.clamp(1, MAX_LEADERBOARD);
        self.posts.top_by_score(limit).await.map_err(|err| {
            error!(limit, error = %err, "failed to load leaderboard");
            AppError::server()
        })
    }

    async fn owned_post(&self, post_id: PostId, author_id: UserId) -> Result<Post> {
        if post_id <= 0 || author_id <= 0 {
            return Err(AppError::Validation("ids must be positive".to_string()));
        }
        let post = self
            .posts
            .find_by_id(post_id)
            .await
            .map_err(|err| {
                error!(post_id, error = %err, "failed to load post");
                AppError::server()
            })?
            .ok_or_else(|| not_found(post_id))?;
        if post.author_id != author_id {
            return Err(AppError::Forbidden(format!(
                "post {} belongs to another author",
                post_id
            )));
        }
        Ok(post)
    }

    /// Writes the status and drops the cached view, also when the write errors.
    async fn set_status(&self, post_id: PostId, status: PostStatus) -> Result<()> {
        let result = self.posts.update_status(post_id, status).await;
        self.details.invalidate(post_id).await;
        let updated = result.map_err(|err| {
            error!(post_id, ?status, error = %err, "failed to update post status");
            AppError::server()
        })?;
        if !updated {
            return Err(not_found(post_id));
        }
        Ok(())
    }
}

fn validate_body(title: &str, content: &str) -> Result<()> {
    let title_chars = title.trim().chars().count();
    if title_chars == 0 || title_chars > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "title must be 1 to {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if content.trim().is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }
    Ok(())
}

fn not_found(post_id: PostId) -> AppError {
    AppError::NotFound(format!("post {}", post_id))
}
