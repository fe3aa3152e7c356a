//! Integration tests for the SQLite state repository.
//!
//! These run against a real (in-memory) SQLite database with the migrations
//! applied, so the SQL itself is exercised.

use spybot::database::repositories::{SqlxStateRepository, StateRepository};
use spybot::database::{DbPool, init_pool_with_size, run_migrations};
use spybot::domain::{SourceKind, TrackedEntity};

/// In-memory databases are per connection, hence a single-connection pool.
async fn setup_test_db() -> DbPool {
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn entity(source: SourceKind, account: &str, watermark: Option<&str>) -> TrackedEntity {
    TrackedEntity {
        watermark: watermark.map(str::to_string),
        ..TrackedEntity::new(source, account)
    }
}

#[tokio::test]
async fn test_migrations_create_tables() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .expect("Failed to query tables");
    let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

    assert!(names.contains(&"subscriptions"), "subscriptions table missing");
    assert!(names.contains(&"tracked_entities"), "tracked_entities table missing");
}

#[tokio::test]
async fn test_empty_state() {
    let repo = SqlxStateRepository::new(setup_test_db().await);
    assert!(repo.load_state().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_and_load() {
    let repo = SqlxStateRepository::new(setup_test_db().await);

    repo.upsert_subscription(10, true, None).await.unwrap();
    repo.upsert_entity(10, &entity(SourceKind::LeetCode, "alice", None))
        .await
        .unwrap();
    repo.upsert_entity(10, &entity(SourceKind::LeetCode, "alice", Some("two-sum")))
        .await
        .unwrap();
    repo.upsert_subscription(10, true, Some("alice: HTTP 502"))
        .await
        .unwrap();

    let state = repo.load_state().await.unwrap();
    assert_eq!(state.len(), 1);
    let sub = &state[0];
    assert_eq!(sub.chat_id, 10);
    assert!(sub.active);
    assert_eq!(sub.last_error.as_deref(), Some("alice: HTTP 502"));
    assert_eq!(
        sub.entities,
        vec![entity(SourceKind::LeetCode, "alice", Some("two-sum"))]
    );
}

#[tokio::test]
async fn test_entity_before_subscription_creates_inactive_parent() {
    let repo = SqlxStateRepository::new(setup_test_db().await);

    let mut magnus = entity(SourceKind::Lichess, "magnus", None);
    magnus.not_found_notified = true;
    repo.upsert_entity(20, &magnus).await.unwrap();

    let state = repo.load_state().await.unwrap();
    assert_eq!(state.len(), 1);
    assert!(!state[0].active);
    assert_eq!(state[0].last_error, None);
    assert_eq!(state[0].entities, vec![magnus]);
}

#[tokio::test]
async fn test_same_account_on_both_sources() {
    let repo = SqlxStateRepository::new(setup_test_db().await);

    repo.upsert_entity(1, &entity(SourceKind::LeetCode, "bob", Some("a")))
        .await
        .unwrap();
    repo.upsert_entity(1, &entity(SourceKind::Lichess, "bob", Some("g1")))
        .await
        .unwrap();
    repo.delete_entity(1, SourceKind::LeetCode, "bob")
        .await
        .unwrap();

    let state = repo.load_state().await.unwrap();
    assert_eq!(
        state[0].entities,
        vec![entity(SourceKind::Lichess, "bob", Some("g1"))]
    );
}

#[tokio::test]
async fn test_delete_missing_entity_is_noop() {
    let repo = SqlxStateRepository::new(setup_test_db().await);
    repo.upsert_subscription(1, false, None).await.unwrap();

    repo.delete_entity(1, SourceKind::LeetCode, "ghost")
        .await
        .unwrap();

    assert_eq!(repo.load_state().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deleting_subscription_cascades() {
    let pool = setup_test_db().await;
    let repo = SqlxStateRepository::new(pool.clone());
    repo.upsert_entity(1, &entity(SourceKind::LeetCode, "alice", None))
        .await
        .unwrap();

    sqlx::query("DELETE FROM subscriptions WHERE chat_id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracked_entities")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_clear_all() {
    let repo = SqlxStateRepository::new(setup_test_db().await);
    repo.upsert_subscription(1, true, None).await.unwrap();
    repo.upsert_entity(2, &entity(SourceKind::Lichess, "magnus", Some("g1")))
        .await
        .unwrap();

    repo.clear_all().await.unwrap();

    assert!(repo.load_state().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_source_rows_are_skipped() {
    let pool = setup_test_db().await;
    let repo = SqlxStateRepository::new(pool.clone());
    repo.upsert_entity(1, &entity(SourceKind::LeetCode, "alice", None))
        .await
        .unwrap();

    sqlx::query(
        "INSERT INTO tracked_entities (chat_id, source, account, created_at, updated_at) VALUES (1, 'codeforces', 'tourist', 0, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let state = repo.load_state().await.unwrap();
    assert_eq!(
        state[0].entities,
        vec![entity(SourceKind::LeetCode, "alice", None)]
    );
}
