//! Engagement Scorer
//!
//! Like toggles and comments, each applied together with its hot score change
//! in one durable transaction. Bookmark toggles share the same locked
//! transaction shape but leave the score alone. Side effects run only after commit: the
//! post's cached detail is invalidated before returning, and notifications
//! are queued on the background pool.

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::Config;
use crate::error::{AppError, Result, StoreResult};
use crate::models::{
    BookmarkState, Comment, CommentId, LikeKey, LikeState, LikeToggle, NewComment,
    NotificationKind, Post, PostId, TargetKind, UserId,
};
use crate::services::{NotificationDispatcher, PostDetailCache};
use crate::store::{CommentStore, EngagementStore, PostStore};

const LIKED_POST: &str = "liked your post";
const LIKED_COMMENT: &str = "liked your comment";
const COMMENTED: &str = "commented on your post";

/// A like target resolved before the transaction starts.
struct LikeTarget {
    /// Post whose score moves
    post_id: PostId,
    /// Author of the liked content, who gets the notification
    author_id: UserId,
    weight: f64,
}

#[derive(Clone)]
pub struct EngagementScorer {
    posts: Arc<dyn PostStore>,
    comments: Arc<dyn CommentStore>,
    engagement: Arc<dyn EngagementStore>,
    details: PostDetailCache,
    notifier: NotificationDispatcher,
    like_post_weight: f64,
    like_comment_weight: f64,
    comment_weight: f64,
}

impl EngagementScorer {
    pub fn new(
        posts: Arc<dyn PostStore>,
        comments: Arc<dyn CommentStore>,
        engagement: Arc<dyn EngagementStore>,
        details: PostDetailCache,
        notifier: NotificationDispatcher,
        config: &Config,
    ) -> Self {
        Self {
            posts,
            comments,
            engagement,
            details,
            notifier,
            like_post_weight: config.like_post_weight,
            like_comment_weight: config.like_comment_weight,
            comment_weight: config.comment_weight,
        }
    }

    // == Toggle Like ==
    /// Flips the like state of (actor, target, kind). `target_kind` is the raw
    /// kind name, `post` or `comment`.
    pub async fn toggle_like(
        &self,
        actor_id: UserId,
        target_id: i64,
        target_kind: &str,
    ) -> Result<LikeToggle> {
        if actor_id <= 0 || target_id <= 0 {
            return Err(AppError::Validation("ids must be positive".to_string()));
        }
        let kind: TargetKind = target_kind.parse()?;
        let target = self.resolve_target(target_id, kind).await?;
        let key = LikeKey {
            actor_id,
            target_id,
            kind,
        };

        let outcome = self
            .toggle_in_tx(&key, target.post_id, target.weight)
            .await
            .map_err(|err| {
                error!(actor_id, target_id, %kind, error = %err, "like transaction failed");
                AppError::server()
            })?;
        let Some((state, score_delta)) = outcome else {
            return Err(AppError::NotFound(format!("post {}", target.post_id)));
        };

        self.details.invalidate(target.post_id).await;

        if state == LikeState::Liked {
            let content = match kind {
                TargetKind::Post => LIKED_POST,
                TargetKind::Comment => LIKED_COMMENT,
            };
            self.notifier.notify(
                target.author_id,
                actor_id,
                NotificationKind::Like,
                content,
                Some(target_id),
            );
        }

        debug!(actor_id, target_id, %kind, ?state, score_delta, "like toggled");
        Ok(LikeToggle {
            state,
            post_id: target.post_id,
            score_delta,
        })
    }

    /// Checks the target outside the transaction. A comment counts only if
    /// its post is still visible.
    async fn resolve_target(&self, target_id: i64, kind: TargetKind) -> Result<LikeTarget> {
        match kind {
            TargetKind::Post => {
                let post = self.find_post(target_id).await?;
                Ok(LikeTarget {
                    post_id: post.id,
                    author_id: post.author_id,
                    weight: self.like_post_weight,
                })
            }
            TargetKind::Comment => {
                let comment = self
                    .comments
                    .find_by_id(target_id)
                    .await
                    .map_err(|err| {
                        error!(comment_id = target_id, error = %err, "failed to load comment");
                        AppError::server()
                    })?
                    .ok_or_else(|| AppError::NotFound(format!("comment {}", target_id)))?;
                self.find_post(comment.post_id).await?;
                Ok(LikeTarget {
                    post_id: comment.post_id,
                    author_id: comment.author_id,
                    weight: self.like_comment_weight,
                })
            }
        }
    }

    /// Returns `None` when the post disappeared before its row was locked.
    async fn toggle_in_tx(
        &self,
        key: &LikeKey,
        post_id: PostId,
        weight: f64,
    ) -> StoreResult<Option<(LikeState, f64)>> {
        let mut tx = self.engagement.begin().await?;
        if tx.lock_post(post_id).await?.is_none() {
            return Ok(None);
        }

        let (state, delta) = if tx.like_exists(key).await? {
            tx.delete_like(key).await?;
            (LikeState::NotLiked, -weight)
        } else {
            tx.insert_like(key).await?;
            (LikeState::Liked, weight)
        };
        tx.add_score(post_id, delta).await?;
        tx.commit().await?;
        Ok(Some((state, delta)))
    }

    // == Toggle Bookmark ==
    /// Flips whether `user_id` has bookmarked `post_id`.
    pub async fn toggle_bookmark(
        &self,
        user_id: UserId,
        post_id: PostId,
    ) -> Result<BookmarkState> {
        if user_id <= 0 || post_id <= 0 {
            return Err(AppError::Validation("ids must be positive".to_string()));
        }
        self.find_post(post_id).await?;

        let state = self
            .bookmark_in_tx(user_id, post_id)
            .await
            .map_err(|err| {
                error!(user_id, post_id, error = %err, "bookmark transaction failed");
                AppError::server()
            })?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        debug!(user_id, post_id, ?state, "bookmark toggled");
        Ok(state)
    }

    async fn bookmark_in_tx(
        &self,
        user_id: UserId,
        post_id: PostId,
    ) -> StoreResult<Option<BookmarkState>> {
        let mut tx = self.engagement.begin().await?;
        if tx.lock_post(post_id).await?.is_none() {
            return Ok(None);
        }

        let state = if tx.bookmark_exists(user_id, post_id).await? {
            tx.delete_bookmark(user_id, post_id).await?;
            BookmarkState::NotBookmarked
        } else {
            tx.insert_bookmark(user_id, post_id).await?;
            BookmarkState::Bookmarked
        };
        tx.commit().await?;
        Ok(Some(state))
    }

    // == Add Comment ==
    /// Appends a comment and credits the post. `parent_id` 0 means top level.
    pub async fn add_comment(
        &self,
        post_id: PostId,
        author_id: UserId,
        content: &str,
        parent_id: CommentId,
    ) -> Result<Comment> {
        if post_id <= 0 || author_id <= 0 || parent_id < 0 {
            return Err(AppError::Validation("ids must be positive".to_string()));
        }
        if content.trim().is_empty() {
            return Err(AppError::Validation("comment must not be empty".to_string()));
        }

        let post = self.find_post(post_id).await?;
        if parent_id != 0 {
            let parent = self.comments.find_by_id(parent_id).await.map_err(|err| {
                error!(comment_id = parent_id, error = %err, "failed to load parent comment");
                AppError::server()
            })?;
            if !parent.is_some_and(|c| c.post_id == post_id) {
                return Err(AppError::Validation(format!(
                    "parent comment {} does not belong to post {}",
                    parent_id, post_id
                )));
            }
        }

        let new = NewComment {
            post_id,
            author_id,
            parent_id,
            content: content.to_string(),
        };
        let comment = self
            .comment_in_tx(&new)
            .await
            .map_err(|err| {
                error!(post_id, author_id, error = %err, "comment transaction failed");
                AppError::server()
            })?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        self.details.invalidate(post_id).await;
        self.notifier.notify(
            post.author_id,
            author_id,
            NotificationKind::Comment,
            COMMENTED,
            Some(post_id),
        );

        debug!(post_id, author_id, comment_id = comment.id, "comment added");
        Ok(comment)
    }

    async fn comment_in_tx(&self, new: &NewComment) -> StoreResult<Option<Comment>> {
        let mut tx = self.engagement.begin().await?;
        if tx.lock_post(new.post_id).await?.is_none() {
            return Ok(None);
        }
        let comment = tx.insert_comment(new).await?;
        tx.add_score(new.post_id, self.comment_weight).await?;
        tx.commit().await?;
        Ok(Some(comment))
    }

    async fn find_post(&self, post_id: PostId) -> Result<Post> {
        self.posts
            .find_by_id(post_id)
            .await
            .map_err(|err| {
                error!(post_id, error = %err, "failed to load post");
                AppError::server()
            })?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
    }
}
