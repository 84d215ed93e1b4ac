//! Post model
//!
//! Posts are owned by their author and soft-deleted through a status
//! transition; rows are never removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PostId, UserId};
use crate::error::StoreError;

/// Kind of post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Article,
    Question,
}

impl PostKind {
    /// Code stored in the `posts.kind` column.
    pub fn code(self) -> i16 {
        match self {
            PostKind::Article => 1,
            PostKind::Question => 2,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, StoreError> {
        match code {
            1 => Ok(PostKind::Article),
            2 => Ok(PostKind::Question),
            other => Err(StoreError::Decode(format!("unknown post kind {}", other))),
        }
    }
}

/// Lifecycle status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Deleted,
}

impl PostStatus {
    /// Code stored in the `posts.status` column.
    pub fn code(self) -> i16 {
        match self {
            PostStatus::Draft => 0,
            PostStatus::Published => 1,
            PostStatus::Deleted => 2,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, StoreError> {
        match code {
            0 => Ok(PostStatus::Draft),
            1 => Ok(PostStatus::Published),
            2 => Ok(PostStatus::Deleted),
            other => Err(StoreError::Decode(format!("unknown post status {}", other))),
        }
    }

    /// Draft and published posts are visible to direct reads.
    pub fn is_visible(self) -> bool {
        !matches!(self, PostStatus::Deleted)
    }
}

/// A post as stored in the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub kind: PostKind,
    pub status: PostStatus,
    /// Hot score adjusted by engagement events
    pub hot_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    /// Sorted-set score used for timelines: creation instant in unix milliseconds.
    pub fn feed_score(&self) -> f64 {
        self.created_at.timestamp_millis() as f64
    }
}

/// Fields required to create a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub kind: PostKind,
    pub status: PostStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_map_back() {
        for status in [PostStatus::Draft, PostStatus::Published, PostStatus::Deleted] {
            assert_eq!(PostStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(PostStatus::from_code(7).is_err());
    }

    #[test]
    fn test_deleted_is_not_visible() {
        assert!(PostStatus::Draft.is_visible());
        assert!(PostStatus::Published.is_visible());
        assert!(!PostStatus::Deleted.is_visible());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&PostKind::Question).unwrap();
        assert_eq!(json, "\"question\"");
    }
}
