//! Notification Dispatcher
//!
//! Best-effort creation of notification rows. Engagement and relation
//! events go through `notify`, which never blocks the caller and never
//! fails it; the read-side operations surface store errors normally.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{AppError, Result};
use crate::models::{NewNotification, Notification, NotificationKind, UserId};
use crate::store::NotificationStore;
use crate::tasks::BackgroundPool;

/// Actor id recorded on system notices.
pub const SYSTEM_ACTOR: UserId = 0;

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    pool: BackgroundPool,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, pool: BackgroundPool) -> Self {
        Self { store, pool }
    }

    // == Notify ==
    /// Queues a notification row. Suppressed when the recipient is the actor;
    /// insert failures are logged and dropped.
    pub fn notify(
        &self,
        recipient_id: UserId,
        actor_id: UserId,
        kind: NotificationKind,
        content: &str,
        target_id: Option<i64>,
    ) {
        if recipient_id == actor_id {
            debug!(recipient_id, ?kind, "self notification suppressed");
            return;
        }

        let store = self.store.clone();
        let new = NewNotification {
            recipient_id,
            actor_id,
            kind,
            content: content.to_string(),
            target_id,
        };
        self.pool.submit("notify", async move {
            if let Err(err) = store.insert(new).await {
                warn!(recipient_id, actor_id, ?kind, error = %err, "failed to create notification");
            }
        });
    }

    // == System Notice ==
    /// Writes a system notice synchronously; the caller sees store errors.
    pub async fn send_system_notice(&self, recipient_id: UserId, content: &str) -> Result<Notification> {
        if recipient_id <= 0 {
            return Err(AppError::Validation("recipient id must be positive".to_string()));
        }
        if content.trim().is_empty() {
            return Err(AppError::Validation("notice content must not be empty".to_string()));
        }
        let new = NewNotification {
            recipient_id,
            actor_id: SYSTEM_ACTOR,
            kind: NotificationKind::System,
            content: content.to_string(),
            target_id: None,
        };
        self.store.insert(new).await.map_err(|err| {
            error!(recipient_id, error = %err, "failed to create system notice");
            AppError::server()
        })
    }

    pub async fn unread_count(&self, recipient_id: UserId) -> Result<i64> {
        self.store.unread_count(recipient_id).await.map_err(|err| {
            error!(recipient_id, error = %err, "failed to count unread notifications");
            AppError::server()
        })
    }

    /// Marks one of the recipient's notifications read.
    pub async fn mark_read(&self, notification_id: i64, recipient_id: UserId) -> Result<()> {
        let updated = self
            .store
            .mark_read(notification_id, recipient_id)
            .await
            .map_err(|err| {
                error!(notification_id, recipient_id, error = %err, "failed to mark notification read");
                AppError::server()
            })?;
        if !updated {
            return Err(AppError::NotFound(format!("notification {}", notification_id)));
        }
        Ok(())
    }

    /// Marks every unread notification of the recipient read; returns how many changed.
    pub async fn mark_all_read(&self, recipient_id: UserId) -> Result<u64> {
        self.store.mark_all_read(recipient_id).await.map_err(|err| {
            error!(recipient_id, error = %err, "failed to mark notifications read");
            AppError::server()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn dispatcher(store: &MemoryStore) -> (NotificationDispatcher, BackgroundPool) {
        let pool = BackgroundPool::new(2, 64, Duration::from_secs(5));
        let dispatcher = NotificationDispatcher::new(Arc::new(store.clone()), pool.clone());
        (dispatcher, pool)
    }

    #[tokio::test]
    async fn test_notify_creates_row_in_background() {
        let store = MemoryStore::new();
        let (dispatcher, pool) = dispatcher(&store);

        dispatcher.notify(1, 2, NotificationKind::Like, "liked your post", Some(9));
        pool.wait_idle().await;

        let rows = store.notifications_for(1).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actor_id, 2);
        assert_eq!(rows[0].target_id, Some(9));
        assert!(!rows[0].is_read);
    }

    #[tokio::test]
    async fn test_self_notification_is_suppressed() {
        let store = MemoryStore::new();
        let (dispatcher, pool) = dispatcher(&store);

        dispatcher.notify(4, 4, NotificationKind::Comment, "commented on your post", None);
        pool.wait_idle().await;

        assert!(store.notifications_for(4).await.is_empty());
    }

    #[tokio::test]
    async fn test_notify_failure_is_swallowed() {
        let store = MemoryStore::new();
        let (dispatcher, pool) = dispatcher(&store);
        store.set_unavailable(true);

        dispatcher.notify(1, 2, NotificationKind::Follow, "followed you", None);
        pool.wait_idle().await;

        store.set_unavailable(false);
        assert!(store.notifications_for(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_state_operations() {
        let store = MemoryStore::new();
        let (dispatcher, _pool) = dispatcher(&store);

        let first = dispatcher.send_system_notice(5, "welcome").await.unwrap();
        dispatcher.send_system_notice(5, "rules updated").await.unwrap();
        assert_eq!(first.actor_id, SYSTEM_ACTOR);
        assert_eq!(dispatcher.unread_count(5).await.unwrap(), 2);

        dispatcher.mark_read(first.id, 5).await.unwrap();
        assert_eq!(dispatcher.unread_count(5).await.unwrap(), 1);

        assert!(matches!(
            dispatcher.mark_read(first.id, 6).await,
            Err(AppError::NotFound(_))
        ));

        assert_eq!(dispatcher.mark_all_read(5).await.unwrap(), 1);
        assert_eq!(dispatcher.unread_count(5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_system_notice_surfaces_store_errors() {
        let store = MemoryStore::new();
        let (dispatcher, _pool) = dispatcher(&store);
        store.set_unavailable(true);

        assert!(matches!(
            dispatcher.send_system_notice(5, "hello").await,
            Err(AppError::Server(_))
        ));
    }
}
