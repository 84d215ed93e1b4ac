//! Integration Tests for scoring and post detail reads
//!
//! Drives `AppState` over the in-memory backends.

mod common;

use std::time::Duration;

use common::TestApp;
use hotfeed::cache::{post_detail_key, SharedCache, TOMBSTONE};
use hotfeed::models::{LikeKey, LikeState, NotificationKind, PostStatus, TargetKind};
use hotfeed::store::{CommentStore, LikeStore, MemoryStore, PostStore};
use hotfeed::{AppError, Config};

const U1: i64 = 1;
const U2: i64 = 2;

// == Like Toggling ==

#[tokio::test]
async fn test_like_unlike_scenario() {
    let app = TestApp::new();
    let post = app.publish(U1, "P").await;
    let key = LikeKey {
        actor_id: U2,
        target_id: post.id,
        kind: TargetKind::Post,
    };

    let first = app
        .state
        .engagement
        .toggle_like(U2, post.id, "post")
        .await
        .unwrap();
    app.settle().await;

    assert_eq!(first.state, LikeState::Liked);
    assert!(app.store.exists(&key).await.unwrap());
    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 10.0);
    let notes = app.store.notifications_for(U1).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].actor_id, U2);
    assert_eq!(notes[0].kind, NotificationKind::Like);
    assert_eq!(notes[0].target_id, Some(post.id));

    let second = app
        .state
        .engagement
        .toggle_like(U2, post.id, "post")
        .await
        .unwrap();
    app.settle().await;

    assert_eq!(second.state, LikeState::NotLiked);
    assert_eq!(second.score_delta, -10.0);
    assert!(!app.store.exists(&key).await.unwrap());
    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 0.0);
    assert_eq!(
        app.store.notifications_for(U1).await.len(),
        1,
        "unliking never notifies"
    );
}

#[tokio::test]
async fn test_self_like_scores_without_notifying() {
    let app = TestApp::new();
    let post = app.publish(U1, "mine").await;

    app.state
        .engagement
        .toggle_like(U1, post.id, "post")
        .await
        .unwrap();
    app.settle().await;

    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 10.0);
    assert!(app.store.notifications_for(U1).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_likes_from_distinct_actors_all_count() {
    let app = TestApp::new();
    let post = app.publish(U1, "popular").await;

    let likes = (100..120).map(|actor| {
        let engagement = app.state.engagement.clone();
        tokio::spawn(async move { engagement.toggle_like(actor, post.id, "post").await })
    });
    for handle in futures::future::join_all(likes).await {
        assert_eq!(handle.unwrap().unwrap().state, LikeState::Liked);
    }
    app.settle().await;

    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 200.0);
    assert_eq!(app.store.count(post.id, TargetKind::Post).await.unwrap(), 20);
    assert_eq!(app.store.notifications_for(U1).await.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_by_one_actor_serialize() {
    for toggles in [7usize, 8] {
        let app = TestApp::new();
        let post = app.publish(U1, "contended").await;

        let handles = (0..toggles).map(|_| {
            let engagement = app.state.engagement.clone();
            tokio::spawn(async move { engagement.toggle_like(U2, post.id, "post").await })
        });
        let mut liked = 0;
        for handle in futures::future::join_all(handles).await {
            if handle.unwrap().unwrap().state == LikeState::Liked {
                liked += 1;
            }
        }
        app.settle().await;

        let key = LikeKey {
            actor_id: U2,
            target_id: post.id,
            kind: TargetKind::Post,
        };
        let odd = toggles % 2 == 1;
        assert_eq!(liked, (toggles + 1) / 2);
        assert_eq!(app.store.exists(&key).await.unwrap(), odd);
        assert_eq!(
            app.store.raw_post(post.id).await.unwrap().hot_score,
            10.0 * (toggles % 2) as f64
        );
        assert_eq!(app.store.notifications_for(U1).await.len(), liked);
    }
}

// == Comments ==

#[tokio::test]
async fn test_comment_adds_five_and_notifies_author() {
    let app = TestApp::new();
    let post = app.publish(U1, "discuss").await;

    let comment = app
        .state
        .engagement
        .add_comment(post.id, U2, "first!", 0)
        .await
        .unwrap();
    app.settle().await;

    assert_eq!(comment.post_id, post.id);
    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 5.0);
    let notes = app.store.notifications_for(U1).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Comment);
}

// == Transaction Failure ==

#[tokio::test]
async fn test_failed_transaction_leaves_no_trace() {
    let app = TestApp::new();
    let post = app.publish(U1, "fragile").await;
    app.store.set_fail_score_updates(true);

    let like = app.state.engagement.toggle_like(U2, post.id, "post").await;
    let comment = app
        .state
        .engagement
        .add_comment(post.id, U2, "lost", 0)
        .await;
    app.settle().await;

    assert!(matches!(like, Err(AppError::Server(_))));
    assert!(matches!(comment, Err(AppError::Server(_))));
    let key = LikeKey {
        actor_id: U2,
        target_id: post.id,
        kind: TargetKind::Post,
    };
    assert!(!app.store.exists(&key).await.unwrap());
    assert!(CommentStore::find_by_id(&app.store, 1).await.unwrap().is_none());
    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 0.0);
    assert!(app.store.notifications_for(U1).await.is_empty());
}

// == Post Detail ==

#[tokio::test]
async fn test_missing_post_is_read_from_store_once() {
    let app = TestApp::new();

    for _ in 0..2 {
        assert!(matches!(
            app.state.details.get_post_detail(777).await,
            Err(AppError::NotFound(_))
        ));
    }

    assert_eq!(app.store.post_reads(), 1);
    assert_eq!(
        app.cache.get(&post_detail_key(777)).await.unwrap().as_deref(),
        Some(TOMBSTONE)
    );
}

#[tokio::test]
async fn test_concurrent_detail_misses_coalesce() {
    let app = TestApp::with_store(
        MemoryStore::with_latency(Duration::from_millis(40)),
        Config::default(),
    );
    let post = app.publish(U1, "hot").await;
    let reads_before = app.store.post_reads();

    let reads = (0..25).map(|_| {
        let details = app.state.details.clone();
        tokio::spawn(async move { details.get_post_detail(post.id).await })
    });
    for handle in futures::future::join_all(reads).await {
        assert_eq!(handle.unwrap().unwrap().post.id, post.id);
    }

    assert_eq!(app.store.post_reads() - reads_before, 1);
}

#[tokio::test]
async fn test_detail_reflects_likes_after_toggle() {
    let app = TestApp::new();
    let post = app.publish(U1, "counted").await;
    assert_eq!(
        app.state.details.get_post_detail(post.id).await.unwrap().like_count,
        0
    );

    app.state
        .engagement
        .toggle_like(U2, post.id, "post")
        .await
        .unwrap();

    let view = app.state.details.get_post_detail(post.id).await.unwrap();
    assert_eq!(view.like_count, 1);
    assert_eq!(view.post.hot_score, 10.0);
}

#[tokio::test]
async fn test_read_racing_a_like_does_not_cache_stale_view() {
    let app = TestApp::with_store(
        MemoryStore::with_latency(Duration::from_millis(50)),
        Config::default(),
    );
    let post = app.publish(U1, "racy").await;

    let like = {
        let engagement = app.state.engagement.clone();
        tokio::spawn(async move { engagement.toggle_like(U2, post.id, "post").await })
    };
    tokio::time::sleep(Duration::from_millis(25)).await;
    // Reads the post before the like commits and counts likes after it
    let racing = app.state.details.get_post_detail(post.id).await.unwrap();
    like.await.unwrap().unwrap();
    assert_eq!(racing.post.id, post.id);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let view = app.state.details.get_post_detail(post.id).await.unwrap();
    assert_eq!(view.post.hot_score, 10.0);
    assert_eq!(view.like_count, 1);
    assert_eq!(app.store.raw_post(post.id).await.unwrap().hot_score, 10.0);
}

#[tokio::test]
async fn test_deleted_post_is_not_found_everywhere() {
    let app = TestApp::new();
    let post = app.publish(U1, "gone").await;
    app.state.posts.delete_post(post.id, U1).await.unwrap();

    assert!(matches!(
        app.state.details.get_post_detail(post.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        app.state.engagement.toggle_like(U2, post.id, "post").await,
        Err(AppError::NotFound(_))
    ));
    let raw = app.store.raw_post(post.id).await.unwrap();
    assert_eq!(raw.status, PostStatus::Deleted);
    assert!(PostStore::find_by_id(&app.store, post.id)
        .await
        .unwrap()
        .is_none());
}
