//! Follow relations
//!
//! Creating an edge seeds the follower's timeline and notifies the followee,
//! both in the background after the edge is durable.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::models::{NotificationKind, UserId};
use crate::services::{FeedDistributor, NotificationDispatcher};
use crate::store::RelationStore;

const FOLLOWED: &str = "followed you";

#[derive(Clone)]
pub struct RelationService {
    relations: Arc<dyn RelationStore>,
    feed: FeedDistributor,
    notifier: NotificationDispatcher,
}

impl RelationService {
    pub fn new(
        relations: Arc<dyn RelationStore>,
        feed: FeedDistributor,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            relations,
            feed,
            notifier,
        }
    }

    // == Follow ==
    pub async fn follow(&self, follower_id: UserId, followee_id: UserId) -> Result<()> {
        validate_pair(follower_id, followee_id)?;
        if follower_id == followee_id {
            return Err(AppError::Validation("cannot follow yourself".to_string()));
        }

        let created = self
            .relations
            .follow(follower_id, followee_id)
            .await
            .map_err(|err| {
                error!(follower_id, followee_id, error = %err, "failed to create follow edge");
                AppError::server()
            })?;
        if !created {
            return Err(AppError::Validation("already following".to_string()));
        }

        self.feed.on_follow(follower_id, followee_id);
        self.notifier.notify(
            followee_id,
            follower_id,
            NotificationKind::Follow,
            FOLLOWED,
            None,
        );

        info!(follower_id, followee_id, "follow created");
        Ok(())
    }

    // == Unfollow ==
    /// Removes the edge. Timelines keep already pushed posts until their TTL.
    pub async fn unfollow(&self, follower_id: UserId, followee_id: UserId) -> Result<()> {
        validate_pair(follower_id, followee_id)?;

        let removed = self
            .relations
            .unfollow(follower_id, followee_id)
            .await
            .map_err(|err| {
                error!(follower_id, followee_id, error = %err, "failed to remove follow edge");
                AppError::server()
            })?;
        if !removed {
            return Err(AppError::NotFound("not following".to_string()));
        }

        info!(follower_id, followee_id, "follow removed");
        Ok(())
    }
}

fn validate_pair(follower_id: UserId, followee_id: UserId) -> Result<()> {
    if follower_id <= 0 || followee_id <= 0 {
        return Err(AppError::Validation("user ids must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::tasks::BackgroundPool;
    use std::time::Duration;

    fn service(store: &MemoryStore) -> (RelationService, BackgroundPool) {
        let config = Config::default();
        let pool = BackgroundPool::new(2, 64, Duration::from_secs(5));
        let feed = FeedDistributor::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(MemoryCache::new()),
            pool.clone(),
            &config,
        );
        let notifier = NotificationDispatcher::new(Arc::new(store.clone()), pool.clone());
        (
            RelationService::new(Arc::new(store.clone()), feed, notifier),
            pool,
        )
    }

    #[tokio::test]
    async fn test_follow_notifies_followee() {
        let store = MemoryStore::new();
        let (relations, pool) = service(&store);

        relations.follow(1, 2).await.unwrap();
        pool.wait_idle().await;

        assert_eq!(store.followee_ids(1).await.unwrap(), vec![2]);
        let rows = store.notifications_for(2).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, NotificationKind::Follow);
        assert_eq!(rows[0].actor_id, 1);
    }

    #[tokio::test]
    async fn test_follow_rejects_self_and_duplicates() {
        let store = MemoryStore::new();
        let (relations, _pool) = service(&store);

        assert!(matches!(
            relations.follow(3, 3).await,
            Err(AppError::Validation(_))
        ));
        relations.follow(3, 4).await.unwrap();
        assert!(matches!(
            relations.follow(3, 4).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unfollow_requires_edge() {
        let store = MemoryStore::new();
        let (relations, _pool) = service(&store);

        assert!(matches!(
            relations.unfollow(1, 2).await,
            Err(AppError::NotFound(_))
        ));
        relations.follow(1, 2).await.unwrap();
        relations.unfollow(1, 2).await.unwrap();
        assert!(store.followee_ids(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edge_failure_is_server_error() {
        let store = MemoryStore::new();
        let (relations, _pool) = service(&store);
        store.set_unavailable(true);

        assert!(matches!(
            relations.follow(1, 2).await,
            Err(AppError::Server(_))
        ));
    }
}
