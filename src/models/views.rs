//! Read models composed by the services

use serde::{Deserialize, Serialize};

use super::Post;

/// Post detail as served and cached by the post detail cache.
///
/// Serialized flat: the post fields plus `like_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetailView {
    #[serde(flatten)]
    pub post: Post,
    pub like_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostKind, PostStatus};
    use chrono::Utc;

    #[test]
    fn test_detail_view_is_flat_json() {
        let view = PostDetailView {
            post: Post {
                id: 3,
                author_id: 1,
                title: "Hello".to_string(),
                content: "body".to_string(),
                kind: PostKind::Article,
                status: PostStatus::Published,
                hot_score: 15.0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            like_count: 2,
        };

        let json: serde_json::Value = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["status"], "published");
        assert_eq!(json["like_count"], 2);

        let back: PostDetailView = serde_json::from_value(json).unwrap();
        assert_eq!(back, view);
    }
}
