//! [`LockStore`] implementation over Postgres.

use std::sync::Arc;

use async_trait::async_trait;
use jollyboard_core::locks::LockEntry;
use jollyboard_core::protocol::LockChange;
use jollyboard_core::store::{LockStore, StoreError};
use jollyboard_core::types::{EpochMillis, ObjectId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::change_feed::LockChangeFeed;
use crate::repositories::BoardLockRepo;
use crate::DbPool;

/// Postgres-backed lock store.
///
/// Cheap to clone: the pool and the change feed are reference counted.
#[derive(Clone)]
pub struct PgLockStore {
    pool: DbPool,
    feed: Arc<LockChangeFeed>,
}

impl PgLockStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            feed: Arc::new(LockChangeFeed::new()),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Spawn the LISTEN/NOTIFY loop feeding [`subscribe`](LockStore::subscribe).
    pub fn start_change_feed(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.feed).listen(self.pool.clone(), cancel))
    }
}

/// Classify a sqlx error into a [`StoreError`].
///
/// - Unique constraint violations (SQLSTATE 23505) map to `Conflict`.
/// - Pool exhaustion and I/O failures map to `Unavailable`.
/// - Everything else maps to `Internal`.
pub fn classify_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            StoreError::Conflict(format!("duplicate lock violates {constraint}"))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Internal(err.to_string()),
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn insert(&self, board_id: &str, entry: &LockEntry) -> Result<(), StoreError> {
        BoardLockRepo::insert(&self.pool, board_id, entry)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn insert_many(&self, board_id: &str, entries: &[LockEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        BoardLockRepo::insert_many(&self.pool, board_id, entries)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn update(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<bool, StoreError> {
        BoardLockRepo::touch(&self.pool, board_id, object_id, user_id, last_active)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn update_many(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<u64, StoreError> {
        if object_ids.is_empty() {
            return Ok(0);
        }
        BoardLockRepo::touch_many(&self.pool, board_id, object_ids, user_id, last_active)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn delete(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        BoardLockRepo::release(&self.pool, board_id, object_id, user_id)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn delete_many(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
    ) -> Result<u64, StoreError> {
        if object_ids.is_empty() {
            return Ok(0);
        }
        BoardLockRepo::release_many(&self.pool, board_id, object_ids, user_id)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn select_by_board(&self, board_id: &str) -> Result<Vec<LockEntry>, StoreError> {
        let rows = BoardLockRepo::list_by_board(&self.pool, board_id)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.into_entry()).collect())
    }

    async fn select_by_board_and_ids(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
    ) -> Result<Vec<LockEntry>, StoreError> {
        if object_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = BoardLockRepo::list_by_ids(&self.pool, board_id, object_ids)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(|r| r.into_entry()).collect())
    }

    async fn subscribe(&self, board_id: &str) -> Result<broadcast::Receiver<LockChange>, StoreError> {
        Ok(self.feed.subscribe(board_id))
    }

    async fn delete_stale(
        &self,
        cutoff: EpochMillis,
    ) -> Result<Vec<(String, LockEntry)>, StoreError> {
        let rows = BoardLockRepo::delete_stale(&self.pool, cutoff)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|r| (r.board_id.clone(), r.into_entry()))
            .collect())
    }
}
