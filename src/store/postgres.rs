//! PostgreSQL durable store
//!
//! Expected tables (schema management lives outside this crate):
//! - `posts(id BIGSERIAL, author_id BIGINT, title TEXT, content TEXT, kind SMALLINT,
//!   status SMALLINT, hot_score DOUBLE PRECISION, created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)`
//! - `likes(user_id BIGINT, target_id BIGINT, target_type SMALLINT, created_at TIMESTAMPTZ,
//!   UNIQUE (user_id, target_id, target_type))`
//! - `bookmarks(user_id BIGINT, post_id BIGINT, created_at TIMESTAMPTZ,
//!   PRIMARY KEY (user_id, post_id))`
//! - `comments(id BIGSERIAL, post_id BIGINT, author_id BIGINT, parent_id BIGINT DEFAULT 0,
//!   content TEXT, created_at TIMESTAMPTZ)`
//! - `relations(follower_id BIGINT, followee_id BIGINT, created_at TIMESTAMPTZ,
//!   PRIMARY KEY (follower_id, followee_id), CHECK (follower_id <> followee_id))`
//! - `notifications(id BIGSERIAL, recipient_id BIGINT, actor_id BIGINT, kind SMALLINT,
//!   content TEXT, target_id BIGINT NULL, is_read BOOLEAN, created_at TIMESTAMPTZ)`

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::info;

use super::{
    CommentStore, EngagementStore, EngagementTx, LikeStore, NotificationStore, PostStore,
    RelationStore,
};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Comment, CommentId, LikeKey, NewComment, NewNotification, NewPost, Notification,
    NotificationKind, Post, PostId, PostKind, PostStatus, TargetKind, UserId,
};

const POST_COLUMNS: &str =
    "id, author_id, title, content, kind, status, hot_score, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, author_id, parent_id, content, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, actor_id, kind, content, target_id, is_read, created_at";

const DELETED: i16 = 2;
const PUBLISHED: i16 = 1;

fn post_from_row(row: &PgRow) -> StoreResult<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        kind: PostKind::from_code(row.try_get("kind")?)?,
        status: PostStatus::from_code(row.try_get("status")?)?,
        hot_score: row.try_get("hot_score")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn posts_from_rows(rows: &[PgRow]) -> StoreResult<Vec<Post>> {
    rows.iter().map(post_from_row).collect()
}

fn comment_from_row(row: &PgRow) -> StoreResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        parent_id: row.try_get("parent_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> StoreResult<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        actor_id: row.try_get("actor_id")?,
        kind: NotificationKind::from_code(row.try_get("kind")?)?,
        content: row.try_get("content")?,
        target_id: row.try_get("target_id")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

// == Pg Store ==
/// sqlx-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        info!(max_connections, "PostgreSQL pool ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create(&self, new: NewPost) -> StoreResult<Post> {
        let sql = format!(
            "INSERT INTO posts (author_id, title, content, kind, status, hot_score, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 0, NOW(), NOW())
             RETURNING {}",
            POST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(new.author_id)
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.kind.code())
            .bind(new.status.code())
            .fetch_one(&self.pool)
            .await?;
        post_from_row(&row)
    }

    async fn find_by_id(&self, id: PostId) -> StoreResult<Option<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE id = $1 AND status <> $2",
            POST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(DELETED)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn find_by_ids(&self, ids: &[PostId]) -> StoreResult<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM posts WHERE id = ANY($1) AND status <> $2",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ids.to_vec())
            .bind(DELETED)
            .fetch_all(&self.pool)
            .await?;
        posts_from_rows(&rows)
    }

    async fn update_score(&self, id: PostId, delta: f64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE posts SET hot_score = hot_score + $2 WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_status(&self, id: PostId, status: PostStatus) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE posts SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.code())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_content(
        &self,
        id: PostId,
        title: &str,
        content: &str,
        status: PostStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE posts SET title = $2, content = $3, status = $4, updated_at = NOW()
             WHERE id = $1 AND status <> $5",
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(status.code())
        .bind(DELETED)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_author_recent(
        &self,
        author_id: UserId,
        limit: usize,
    ) -> StoreResult<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE author_id = $1 AND status = $2
             ORDER BY created_at DESC, id DESC LIMIT $3",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(author_id)
            .bind(PUBLISHED)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        posts_from_rows(&rows)
    }

    async fn list_published_by_authors(
        &self,
        author_ids: &[UserId],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Post>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM posts WHERE author_id = ANY($1) AND status = $2
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(author_ids.to_vec())
            .bind(PUBLISHED)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        posts_from_rows(&rows)
    }

    async fn top_by_score(&self, limit: usize) -> StoreResult<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE status = $1
             ORDER BY hot_score DESC, created_at DESC LIMIT $2",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(PUBLISHED)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        posts_from_rows(&rows)
    }
}

#[async_trait]
impl LikeStore for PgStore {
    async fn exists(&self, key: &LikeKey) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM likes WHERE user_id = $1 AND target_id = $2 AND target_type = $3
            )",
        )
        .bind(key.actor_id)
        .bind(key.target_id)
        .bind(key.kind.code())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count(&self, target_id: i64, kind: TargetKind) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE target_id = $1 AND target_type = $2")
                .bind(target_id)
                .bind(kind.code())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(comment_from_row).transpose()
    }
}

#[async_trait]
impl RelationStore for PgStore {
    async fn follow(&self, follower_id: UserId, followee_id: UserId) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO relations (follower_id, followee_id, created_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (follower_id, followee_id) DO NOTHING",
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower_id: UserId, followee_id: UserId) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM relations WHERE follower_id = $1 AND followee_id = $2")
                .bind(follower_id)
                .bind(followee_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn followee_ids(&self, user_id: UserId) -> StoreResult<Vec<UserId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT followee_id FROM relations WHERE follower_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn follower_ids(&self, user_id: UserId) -> StoreResult<Vec<UserId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT follower_id FROM relations WHERE followee_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, new: NewNotification) -> StoreResult<Notification> {
        let sql = format!(
            "INSERT INTO notifications (recipient_id, actor_id, kind, content, target_id, is_read, created_at)
             VALUES ($1, $2, $3, $4, $5, FALSE, NOW())
             RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(new.recipient_id)
            .bind(new.actor_id)
            .bind(new.kind.code())
            .bind(&new.content)
            .bind(new.target_id)
            .fetch_one(&self.pool)
            .await?;
        notification_from_row(&row)
    }

    async fn unread_count(&self, recipient_id: UserId) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, id: i64, recipient_id: UserId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
        )
        .bind(id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// == Transactions ==
struct PgEngagementTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EngagementStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn EngagementTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgEngagementTx { tx }))
    }
}

#[async_trait]
impl EngagementTx for PgEngagementTx {
    async fn lock_post(&mut self, id: PostId) -> StoreResult<Option<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE id = $1 AND status <> $2 FOR UPDATE",
            POST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(DELETED)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn like_exists(&mut self, key: &LikeKey) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM likes WHERE user_id = $1 AND target_id = $2 AND target_type = $3
            )",
        )
        .bind(key.actor_id)
        .bind(key.target_id)
        .bind(key.kind.code())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_like(&mut self, key: &LikeKey) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO likes (user_id, target_id, target_type, created_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(key.actor_id)
        .bind(key.target_id)
        .bind(key.kind.code())
        .execute(&mut *self.tx)
        .await
        .map_err(|err| unique_conflict(err, "like"))?;
        Ok(())
    }

    async fn delete_like(&mut self, key: &LikeKey) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM likes WHERE user_id = $1 AND target_id = $2 AND target_type = $3",
        )
        .bind(key.actor_id)
        .bind(key.target_id)
        .bind(key.kind.code())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn bookmark_exists(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE user_id = $1 AND post_id = $2)",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_bookmark(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        sqlx::query("INSERT INTO bookmarks (user_id, post_id, created_at) VALUES ($1, $2, NOW())")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| unique_conflict(err, "bookmark"))?;
        Ok(())
    }

    async fn delete_bookmark(&mut self, user_id: UserId, post_id: PostId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&mut self, new: &NewComment) -> StoreResult<Comment> {
        let sql = format!(
            "INSERT INTO comments (post_id, author_id, parent_id, content, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING {}",
            COMMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(new.post_id)
            .bind(new.author_id)
            .bind(new.parent_id)
            .bind(&new.content)
            .fetch_one(&mut *self.tx)
            .await?;
        comment_from_row(&row)
    }

    async fn add_score(&mut self, id: PostId, delta: f64) -> StoreResult<()> {
        sqlx::query("UPDATE posts SET hot_score = hot_score + $2 WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgEngagementTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

/// Maps a unique violation onto `StoreError::Conflict`.
fn unique_conflict(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(format!("duplicate {}", what));
        }
    }
    StoreError::Database(err)
}
