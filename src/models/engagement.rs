//! Like and comment models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommentId, PostId, UserId};
use crate::error::{AppError, StoreError};

/// What a like points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    /// Code stored in the `likes.target_type` column.
    pub fn code(self) -> i16 {
        match self {
            TargetKind::Post => 1,
            TargetKind::Comment => 2,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, StoreError> {
        match code {
            1 => Ok(TargetKind::Post),
            2 => Ok(TargetKind::Comment),
            other => Err(StoreError::Decode(format!("unknown like target {}", other))),
        }
    }
}

impl FromStr for TargetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(TargetKind::Post),
            "comment" => Ok(TargetKind::Comment),
            other => Err(AppError::Validation(format!(
                "target kind must be 'post' or 'comment', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Post => f.write_str("post"),
            TargetKind::Comment => f.write_str("comment"),
        }
    }
}

/// Identity of a like row. At most one row exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LikeKey {
    pub actor_id: UserId,
    pub target_id: i64,
    pub kind: TargetKind,
}

/// Like state of a (actor, target, kind) tuple after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    Liked,
    NotLiked,
}

/// Outcome of a committed like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LikeToggle {
    pub state: LikeState,
    /// Post whose hot score changed
    pub post_id: PostId,
    /// Signed score delta applied to that post
    pub score_delta: f64,
}

/// Bookmark state of a (user, post) pair after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookmarkState {
    Bookmarked,
    NotBookmarked,
}

/// A comment on a post. Comments are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    /// Parent comment, 0 for a top-level comment
    pub parent_id: CommentId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: CommentId,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("post".parse::<TargetKind>().unwrap(), TargetKind::Post);
        assert_eq!("comment".parse::<TargetKind>().unwrap(), TargetKind::Comment);
        assert!(matches!(
            "share".parse::<TargetKind>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_target_kind_codes() {
        assert_eq!(TargetKind::from_code(TargetKind::Comment.code()).unwrap(), TargetKind::Comment);
        assert!(TargetKind::from_code(0).is_err());
    }
}
