//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    System,
    Message,
}

impl NotificationKind {
    /// Code stored in the `notifications.kind` column.
    pub fn code(self) -> i16 {
        match self {
            NotificationKind::Like => 1,
            NotificationKind::Comment => 2,
            NotificationKind::Follow => 3,
            NotificationKind::System => 4,
            NotificationKind::Message => 5,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, StoreError> {
        match code {
            1 => Ok(NotificationKind::Like),
            2 => Ok(NotificationKind::Comment),
            3 => Ok(NotificationKind::Follow),
            4 => Ok(NotificationKind::System),
            5 => Ok(NotificationKind::Message),
            other => Err(StoreError::Decode(format!(
                "unknown notification kind {}",
                other
            ))),
        }
    }
}

/// A notification owned by its recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: UserId,
    /// Acting user, 0 for system notices
    pub actor_id: UserId,
    pub kind: NotificationKind,
    pub content: String,
    pub target_id: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: UserId,
    pub actor_id: UserId,
    pub kind: NotificationKind,
    pub content: String,
    pub target_id: Option<i64>,
}
