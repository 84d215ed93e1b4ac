//! Durable Store Module
//!
//! Traits for the relational store that owns posts, likes, bookmarks,
//! comments, relations and notifications, plus two backends:
//! - `MemoryStore`: in-process, transactional, used by tests and embedders
//! - `PgStore`: PostgreSQL via sqlx
//!
//! Every read path filters soft-deleted posts unless a method says otherwise.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{
    Comment, CommentId, LikeKey, NewComment, NewNotification, NewPost, Notification, Post, PostId,
    PostStatus, TargetKind, UserId,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

// == Post Store ==
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, new: NewPost) -> StoreResult<Post>;

    /// Visible (draft or published) post by id; deleted posts read as `None`.
    async fn find_by_id(&self, id: PostId) -> StoreResult<Option<Post>>;

    /// Visible posts for a batch of ids, in no particular order.
    async fn find_by_ids(&self, ids: &[PostId]) -> StoreResult<Vec<Post>>;

    /// Atomically adds `delta` to the hot score. Returns false if no row matched.
    async fn update_score(&self, id: PostId, delta: f64) -> StoreResult<bool>;

    async fn update_status(&self, id: PostId, status: PostStatus) -> StoreResult<bool>;

    /// Rewrites title, content and status of a visible post in one statement.
    async fn update_content(
        &self,
        id: PostId,
        title: &str,
        content: &str,
        status: PostStatus,
    ) -> StoreResult<bool>;

    /// Most recent published posts of one author, newest first.
    async fn list_by_author_recent(&self, author_id: UserId, limit: usize)
        -> StoreResult<Vec<Post>>;

    /// Published posts of several authors ordered by (created_at, id) descending.
    async fn list_published_by_authors(
        &self,
        author_ids: &[UserId],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Post>>;

    /// Published posts ordered by hot score descending.
    async fn top_by_score(&self, limit: usize) -> StoreResult<Vec<Post>>;
}

// == Like Store ==
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn exists(&self, key: &LikeKey) -> StoreResult<bool>;

    async fn count(&self, target_id: i64, kind: TargetKind) -> StoreResult<i64>;
}

// == Comment Store ==
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>>;
}

// == Relation Store ==
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Creates the edge. Returns false if it already existed.
    async fn follow(&self, follower_id: UserId, followee_id: UserId) -> StoreResult<bool>;

    /// Removes the edge. Returns false if there was none.
    async fn unfollow(&self, follower_id: UserId, followee_id: UserId) -> StoreResult<bool>;

    /// Users that `user_id` follows.
    async fn followee_ids(&self, user_id: UserId) -> StoreResult<Vec<UserId>>;

    /// Users following `user_id`.
    async fn follower_ids(&self, user_id: UserId) -> StoreResult<Vec<UserId>>;
}

// == Notification Store ==
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, new: NewNotification) -> StoreResult<Notification>;

    async fn unread_count(&self, recipient_id: UserId) -> StoreResult<i64>;

    /// Marks one notification read. Returns false unless `recipient_id` owns it.
    async fn mark_read(&self, id: i64, recipient_id: UserId) -> StoreResult<bool>;

    async fn mark_all_read(&self, recipient_id: UserId) -> StoreResult<u64>;
}

// == Engagement Transactions ==
/// Entry point for the all-or-nothing scoring transactions.
#[async_trait]
pub trait EngagementStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn EngagementTx>>;
}

/// An open scoring transaction.
///
/// Dropping it without calling `commit` rolls every statement back.
#[async_trait]
pub trait EngagementTx: Send {
    /// Locks the post row for the rest of the transaction and returns it,
    /// or `None` if it is absent or deleted.
    async fn lock_post(&mut self, id: PostId) -> StoreResult<Option<Post>>;

    async fn like_exists(&mut self, key: &LikeKey) -> StoreResult<bool>;

    async fn insert_like(&mut self, key: &LikeKey) -> StoreResult<()>;

    async fn delete_like(&mut self, key: &LikeKey) -> StoreResult<bool>;

    async fn bookmark_exists(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<bool>;

    async fn insert_bookmark(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<()>;

    async fn delete_bookmark(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<bool>;

    async fn insert_comment(&mut self, new: &NewComment) -> StoreResult<Comment>;

    /// `hot_score = hot_score + delta`, never a read-then-write.
    async fn add_score(&mut self, id: PostId, delta: f64) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
