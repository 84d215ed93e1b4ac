//! Domain models shared by the stores, the cache and the services
//!
//! Durable entities (posts, likes, comments, notifications) and the
//! read models derived from them.

pub mod engagement;
pub mod notification;
pub mod post;
pub mod views;

pub type PostId = i64;
pub type UserId = i64;
pub type CommentId = i64;

// Re-export commonly used types
pub use engagement::{
    BookmarkState, Comment, LikeKey, LikeState, LikeToggle, NewComment, TargetKind,
};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use post::{NewPost, Post, PostKind, PostStatus};
pub use views::PostDetailView;
