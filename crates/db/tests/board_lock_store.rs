//! Integration tests for the Postgres lock store.
//!
//! Exercises the store against a real database:
//! - Uniqueness on (board_id, object_id)
//! - Owner-only refresh and release
//! - Atomic batch insert
//! - Stale lock reclamation
//! - LISTEN/NOTIFY change feed

use std::time::Duration;

use jollyboard_core::locks::LockEntry;
use jollyboard_core::protocol::ChangeKind;
use jollyboard_core::store::{LockStore, StoreError};
use jollyboard_db::PgLockStore;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn entry(object_id: &str, user_id: &str, last_active: i64) -> LockEntry {
    LockEntry::new(object_id, user_id, format!("Captain {user_id}"), last_active)
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_insert_for_same_object_conflicts(pool: PgPool) {
    let store = PgLockStore::new(pool);

    store.insert("board-1", &entry("x", "U1", 1)).await.unwrap();
    let err = store.insert("board-1", &entry("x", "U2", 2)).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");

    // Same object id on another board is independent.
    store.insert("board-2", &entry("x", "U2", 2)).await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_and_delete_require_ownership(pool: PgPool) {
    let store = PgLockStore::new(pool);
    store.insert("board-1", &entry("x", "U1", 1)).await.unwrap();

    assert!(!store.update("board-1", "x", "U2", 5).await.unwrap());
    assert!(store.update("board-1", "x", "U1", 5).await.unwrap());
    assert!(!store.delete("board-1", "x", "U2").await.unwrap());

    let rows = store.select_by_board("board-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].last_active, 5);

    assert!(store.delete("board-1", "x", "U1").await.unwrap());
    assert!(store.select_by_board("board-1").await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn insert_many_is_all_or_nothing(pool: PgPool) {
    let store = PgLockStore::new(pool);
    store.insert("board-1", &entry("b", "U2", 1)).await.unwrap();

    let batch = vec![entry("a", "U1", 2), entry("b", "U1", 2), entry("c", "U1", 2)];
    let err = store.insert_many("board-1", &batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let rows = store
        .select_by_board_and_ids("board-1", &ids(&["a", "b", "c"]))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "U2");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn bulk_update_and_delete_skip_foreign_rows(pool: PgPool) {
    let store = PgLockStore::new(pool);
    store
        .insert_many("board-1", &[entry("a", "U1", 1), entry("b", "U2", 1)])
        .await
        .unwrap();

    let touched = store
        .update_many("board-1", &ids(&["a", "b"]), "U1", 9)
        .await
        .unwrap();
    assert_eq!(touched, 1);

    let removed = store
        .delete_many("board-1", &ids(&["a", "b"]), "U1")
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let rows = store.select_by_board("board-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].object_id, "b");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_stale_only_removes_old_rows(pool: PgPool) {
    let store = PgLockStore::new(pool);
    store.insert("board-1", &entry("old", "U1", 100)).await.unwrap();
    store.insert("board-2", &entry("fresh", "U2", 900)).await.unwrap();

    let reclaimed = store.delete_stale(500).await.unwrap();

    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].0, "board-1");
    assert_eq!(reclaimed[0].1.object_id, "old");
    assert_eq!(store.select_by_board("board-2").await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn change_feed_reports_row_changes(pool: PgPool) {
    let store = PgLockStore::new(pool);
    let cancel = CancellationToken::new();
    let handle = store.start_change_feed(cancel.clone());
    let mut rx = store.subscribe("board-1").await.unwrap();

    // Give the listener a moment to issue LISTEN before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.insert("board-1", &entry("x", "U1", 1)).await.unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("change notification should arrive")
        .unwrap();
    assert_eq!(change.kind, ChangeKind::Insert);
    assert_eq!(change.object_id, "x");
    assert_eq!(change.user_id, "U1");

    cancel.cancel();
    handle.await.unwrap();
}
