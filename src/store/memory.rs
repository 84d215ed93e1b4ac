//! In-memory durable store
//!
//! Keeps every table in one `MemoryState` behind an async mutex. Scoring
//! transactions hold the mutex for their whole lifetime, which serializes them
//! the way row locks do in PostgreSQL. They write in place and record an undo
//! entry per change; dropping an uncommitted transaction replays the log
//! backwards.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    CommentStore, EngagementStore, EngagementTx, LikeStore, NotificationStore, PostStore,
    RelationStore,
};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Comment, CommentId, LikeKey, NewComment, NewNotification, NewPost, Notification, Post, PostId,
    PostStatus, TargetKind, UserId,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    posts: BTreeMap<PostId, Post>,
    likes: HashSet<LikeKey>,
    bookmarks: HashSet<(UserId, PostId)>,
    comments: BTreeMap<CommentId, Comment>,
    relations: BTreeSet<(UserId, UserId)>,
    notifications: BTreeMap<i64, Notification>,
    last_post_id: PostId,
    last_comment_id: CommentId,
    last_notification_id: i64,
    last_instant: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Strictly increasing creation instants at millisecond resolution, the
    /// resolution timelines are scored with.
    fn next_instant(&mut self) -> DateTime<Utc> {
        let wall = Utc::now();
        let mut now = Utc
            .timestamp_millis_opt(wall.timestamp_millis())
            .single()
            .unwrap_or(wall);
        if let Some(last) = self.last_instant {
            if now <= last {
                now = last + chrono::Duration::milliseconds(1);
            }
        }
        self.last_instant = Some(now);
        now
    }

    fn visible_post(&self, id: PostId) -> Option<&Post> {
        self.posts.get(&id).filter(|p| p.status.is_visible())
    }

    fn insert_comment(&mut self, new: &NewComment) -> Comment {
        self.last_comment_id += 1;
        let comment = Comment {
            id: self.last_comment_id,
            post_id: new.post_id,
            author_id: new.author_id,
            parent_id: new.parent_id,
            content: new.content.clone(),
            created_at: self.next_instant(),
        };
        self.comments.insert(comment.id, comment.clone());
        comment
    }
}

fn newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

// == Memory Store ==
/// In-process implementation of every store trait.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// Number of `PostStore::find_by_id` calls served
    post_reads: Arc<AtomicUsize>,
    /// Simulated round trip applied to every call
    latency: Option<Duration>,
    unavailable: Arc<AtomicBool>,
    fail_score_updates: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a store that sleeps for `latency` on every call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Number of single-post reads served so far.
    pub fn post_reads(&self) -> usize {
        self.post_reads.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes `EngagementTx::add_score` fail, aborting the transaction.
    pub fn set_fail_score_updates(&self, fail: bool) {
        self.fail_score_updates.store(fail, Ordering::SeqCst);
    }

    /// All notifications of a recipient, oldest first.
    pub async fn notifications_for(&self, recipient_id: UserId) -> Vec<Notification> {
        let state = self.state.lock().await;
        state
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    /// Whether `user_id` has bookmarked `post_id`.
    pub async fn is_bookmarked(&self, user_id: UserId, post_id: PostId) -> bool {
        self.state.lock().await.bookmarks.contains(&(user_id, post_id))
    }

    /// Post by id regardless of status.
    pub async fn raw_post(&self, id: PostId) -> Option<Post> {
        self.state.lock().await.posts.get(&id).cloned()
    }

    async fn round_trip(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, new: NewPost) -> StoreResult<Post> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        state.last_post_id += 1;
        let now = state.next_instant();
        let post = Post {
            id: state.last_post_id,
            author_id: new.author_id,
            title: new.title,
            content: new.content,
            kind: new.kind,
            status: new.status,
            hot_score: 0.0,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_by_id(&self, id: PostId) -> StoreResult<Option<Post>> {
        self.post_reads.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        let state = self.state.lock().await;
        Ok(state.visible_post(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[PostId]) -> StoreResult<Vec<Post>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| state.visible_post(*id).cloned())
            .collect())
    }

    async fn update_score(&self, id: PostId, delta: f64) -> StoreResult<bool> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        match state.posts.get_mut(&id) {
            Some(post) => {
                post.hot_score += delta;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(&self, id: PostId, status: PostStatus) -> StoreResult<bool> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        match state.posts.get_mut(&id) {
            Some(post) => {
                post.status = status;
                post.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_content(
        &self,
        id: PostId,
        title: &str,
        content: &str,
        status: PostStatus,
    ) -> StoreResult<bool> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        match state.posts.get_mut(&id).filter(|p| p.status.is_visible()) {
            Some(post) => {
                post.title = title.to_string();
                post.content = content.to_string();
                post.status = status;
                post.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_by_author_recent(
        &self,
        author_id: UserId,
        limit: usize,
    ) -> StoreResult<Vec<Post>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| p.author_id == author_id && p.is_published())
            .cloned()
            .collect();
        newest_first(&mut posts);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn list_published_by_authors(
        &self,
        author_ids: &[UserId],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Post>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| p.is_published() && author_ids.contains(&p.author_id))
            .cloned()
            .collect();
        newest_first(&mut posts);
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }

    async fn top_by_score(&self, limit: usize) -> StoreResult<Vec<Post>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| p.is_published())
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            b.hot_score
                .total_cmp(&a.hot_score)
                .then(b.created_at.cmp(&a.created_at))
        });
        posts.truncate(limit);
        Ok(posts)
    }
}

#[async_trait]
impl LikeStore for MemoryStore {
    async fn exists(&self, key: &LikeKey) -> StoreResult<bool> {
        self.round_trip().await?;
        Ok(self.state.lock().await.likes.contains(key))
    }

    async fn count(&self, target_id: i64, kind: TargetKind) -> StoreResult<i64> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        Ok(state
            .likes
            .iter()
            .filter(|k| k.target_id == target_id && k.kind == kind)
            .count() as i64)
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        self.round_trip().await?;
        Ok(self.state.lock().await.comments.get(&id).cloned())
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn follow(&self, follower_id: UserId, followee_id: UserId) -> StoreResult<bool> {
        self.round_trip().await?;
        Ok(self
            .state
            .lock()
            .await
            .relations
            .insert((follower_id, followee_id)))
    }

    async fn unfollow(&self, follower_id: UserId, followee_id: UserId) -> StoreResult<bool> {
        self.round_trip().await?;
        Ok(self
            .state
            .lock()
            .await
            .relations
            .remove(&(follower_id, followee_id)))
    }

    async fn followee_ids(&self, user_id: UserId) -> StoreResult<Vec<UserId>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        Ok(state
            .relations
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followee)| *followee)
            .collect())
    }

    async fn follower_ids(&self, user_id: UserId) -> StoreResult<Vec<UserId>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        Ok(state
            .relations
            .iter()
            .filter(|(_, followee)| *followee == user_id)
            .map(|(follower, _)| *follower)
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, new: NewNotification) -> StoreResult<Notification> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        state.last_notification_id += 1;
        let notification = Notification {
            id: state.last_notification_id,
            recipient_id: new.recipient_id,
            actor_id: new.actor_id,
            kind: new.kind,
            content: new.content,
            target_id: new.target_id,
            is_read: false,
            created_at: Utc::now(),
        };
        state
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn unread_count(&self, recipient_id: UserId) -> StoreResult<i64> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, id: i64, recipient_id: UserId) -> StoreResult<bool> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        match state
            .notifications
            .get_mut(&id)
            .filter(|n| n.recipient_id == recipient_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> StoreResult<u64> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for notification in state.notifications.values_mut() {
            if notification.recipient_id == recipient_id && !notification.is_read {
                notification.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

// == Transactions ==
/// Reverses one change made inside a transaction.
enum Undo {
    LikeInserted(LikeKey),
    LikeDeleted(LikeKey),
    BookmarkInserted(UserId, PostId),
    BookmarkDeleted(UserId, PostId),
    CommentInserted {
        id: CommentId,
        last_comment_id: CommentId,
        last_instant: Option<DateTime<Utc>>,
    },
    Score {
        id: PostId,
        previous: f64,
    },
}

impl Undo {
    fn revert(self, state: &mut MemoryState) {
        match self {
            Undo::LikeInserted(key) => {
                state.likes.remove(&key);
            }
            Undo::LikeDeleted(key) => {
                state.likes.insert(key);
            }
            Undo::BookmarkInserted(user_id, post_id) => {
                state.bookmarks.remove(&(user_id, post_id));
            }
            Undo::BookmarkDeleted(user_id, post_id) => {
                state.bookmarks.insert((user_id, post_id));
            }
            Undo::CommentInserted {
                id,
                last_comment_id,
                last_instant,
            } => {
                state.comments.remove(&id);
                state.last_comment_id = last_comment_id;
                state.last_instant = last_instant;
            }
            Undo::Score { id, previous } => {
                if let Some(post) = state.posts.get_mut(&id) {
                    post.hot_score = previous;
                }
            }
        }
    }
}

struct MemoryTx {
    state: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
    committed: bool,
    fail_score_updates: bool,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(undo) = self.undo.pop() {
            undo.revert(&mut self.state);
        }
    }
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn EngagementTx>> {
        self.round_trip().await?;
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            state,
            undo: Vec::new(),
            committed: false,
            fail_score_updates: self.fail_score_updates.load(Ordering::SeqCst),
        }))
    }
}

#[async_trait]
impl EngagementTx for MemoryTx {
    async fn lock_post(&mut self, id: PostId) -> StoreResult<Option<Post>> {
        // The whole state is already locked for this transaction.
        Ok(self.state.visible_post(id).cloned())
    }

    async fn like_exists(&mut self, key: &LikeKey) -> StoreResult<bool> {
        Ok(self.state.likes.contains(key))
    }

    async fn insert_like(&mut self, key: &LikeKey) -> StoreResult<()> {
        if !self.state.likes.insert(*key) {
            return Err(StoreError::Conflict(format!(
                "duplicate like for target {}",
                key.target_id
            )));
        }
        self.undo.push(Undo::LikeInserted(*key));
        Ok(())
    }

    async fn delete_like(&mut self, key: &LikeKey) -> StoreResult<bool> {
        let removed = self.state.likes.remove(key);
        if removed {
            self.undo.push(Undo::LikeDeleted(*key));
        }
        Ok(removed)
    }

    async fn bookmark_exists(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<bool> {
        Ok(self.state.bookmarks.contains(&(user_id, post_id)))
    }

    async fn insert_bookmark(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        if !self.state.bookmarks.insert((user_id, post_id)) {
            return Err(StoreError::Conflict(format!(
                "duplicate bookmark for post {}",
                post_id
            )));
        }
        self.undo.push(Undo::BookmarkInserted(user_id, post_id));
        Ok(())
    }

    async fn delete_bookmark(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<bool> {
        let removed = self.state.bookmarks.remove(&(user_id, post_id));
        if removed {
            self.undo.push(Undo::BookmarkDeleted(user_id, post_id));
        }
        Ok(removed)
    }

    async fn insert_comment(&mut self, new: &NewComment) -> StoreResult<Comment> {
        let last_comment_id = self.state.last_comment_id;
        let last_instant = self.state.last_instant;
        let comment = self.state.insert_comment(new);
        self.undo.push(Undo::CommentInserted {
            id: comment.id,
            last_comment_id,
            last_instant,
        });
        Ok(comment)
    }

    async fn add_score(&mut self, id: PostId, delta: f64) -> StoreResult<()> {
        if self.fail_score_updates {
            return Err(StoreError::Unavailable("score update rejected".to_string()));
        }
        match self.state.posts.get_mut(&id) {
            Some(post) => {
                let previous = post.hot_score;
                post.hot_score += delta;
                self.undo.push(Undo::Score { id, previous });
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!("post {} vanished", id))),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tx = self;
        tx.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostKind;

    fn new_post(author_id: UserId, status: PostStatus) -> NewPost {
        NewPost {
            author_id,
            title: "title".to_string(),
            content: "content".to_string(),
            kind: PostKind::Article,
            status,
        }
    }

    #[tokio::test]
    async fn test_find_excludes_deleted() {
        let store = MemoryStore::new();
        let post = store.create(new_post(1, PostStatus::Published)).await.unwrap();

        store
            .update_status(post.id, PostStatus::Deleted)
            .await
            .unwrap();

        assert!(PostStore::find_by_id(&store, post.id).await.unwrap().is_none());
        assert!(store.find_by_ids(&[post.id]).await.unwrap().is_empty());
        assert!(store.raw_post(post.id).await.is_some());
    }

    #[tokio::test]
    async fn test_creation_instants_strictly_increase() {
        let store = MemoryStore::new();
        let a = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        let b = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        assert!(b.created_at > a.created_at);
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = MemoryStore::new();
        let post = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        let key = LikeKey {
            actor_id: 2,
            target_id: post.id,
            kind: TargetKind::Post,
        };

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_like(&key).await.unwrap();
            tx.add_score(post.id, 10.0).await.unwrap();
            // dropped without commit
        }

        assert!(!store.exists(&key).await.unwrap());
        assert_eq!(store.raw_post(post.id).await.unwrap().hot_score, 0.0);
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let post = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        let key = LikeKey {
            actor_id: 2,
            target_id: post.id,
            kind: TargetKind::Post,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_like(&key).await.unwrap();
        tx.add_score(post.id, 10.0).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.count(post.id, TargetKind::Post).await.unwrap(), 1);
        assert_eq!(store.raw_post(post.id).await.unwrap().hot_score, 10.0);
    }

    #[tokio::test]
    async fn test_list_published_by_authors_paginates_newest_first() {
        let store = MemoryStore::new();
        let first = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        store.create(new_post(3, PostStatus::Published)).await.unwrap();
        store.create(new_post(2, PostStatus::Draft)).await.unwrap();
        let last = store.create(new_post(2, PostStatus::Published)).await.unwrap();

        let page = store
            .list_published_by_authors(&[1, 2], 0, 10)
            .await
            .unwrap();
        let ids: Vec<PostId> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![last.id, first.id]);

        let second = store
            .list_published_by_authors(&[1, 2], 1, 10)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first.id);
    }

    #[tokio::test]
    async fn test_relations_are_unique_edges() {
        let store = MemoryStore::new();
        assert!(store.follow(1, 2).await.unwrap());
        assert!(!store.follow(1, 2).await.unwrap());
        assert_eq!(store.follower_ids(2).await.unwrap(), vec![1]);
        assert_eq!(store.followee_ids(1).await.unwrap(), vec![2]);
        assert!(store.unfollow(1, 2).await.unwrap());
        assert!(store.follower_ids(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result = store.followee_ids(1).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_duplicate_like_is_a_conflict() {
        let store = MemoryStore::new();
        let post = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        let key = LikeKey {
            actor_id: 2,
            target_id: post.id,
            kind: TargetKind::Post,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_like(&key).await.unwrap();
        assert!(matches!(
            tx.insert_like(&key).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_deleted_rows_and_comment_ids() {
        let store = MemoryStore::new();
        let post = store.create(new_post(1, PostStatus::Published)).await.unwrap();
        let key = LikeKey {
            actor_id: 2,
            target_id: post.id,
            kind: TargetKind::Post,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_like(&key).await.unwrap();
        tx.insert_bookmark(2, post.id).await.unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.delete_like(&key).await.unwrap());
            assert!(tx.delete_bookmark(2, post.id).await.unwrap());
            tx.insert_comment(&NewComment {
                post_id: post.id,
                author_id: 3,
                parent_id: 0,
                content: "dropped".to_string(),
            })
            .await
            .unwrap();
            tx.add_score(post.id, 5.0).await.unwrap();
        }

        assert!(store.exists(&key).await.unwrap());
        assert!(store.is_bookmarked(2, post.id).await);
        assert!(CommentStore::find_by_id(&store, 1).await.unwrap().is_none());
        assert_eq!(store.raw_post(post.id).await.unwrap().hot_score, 0.0);

        let mut tx = store.begin().await.unwrap();
        let comment = tx
            .insert_comment(&NewComment {
                post_id: post.id,
                author_id: 3,
                parent_id: 0,
                content: "kept".to_string(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(comment.id, 1);
    }
}
