//! Contracts for the durable lock store and the per-board broadcast channel.
//!
//! Both are consumed by the lock client as trait objects so the locking logic
//! can run against Postgres, an in-memory store, or a test double.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::locks::LockEntry;
use crate::protocol::{BroadcastEvent, LockChange};
use crate::types::{EpochMillis, ObjectId};

/// Errors surfaced by a [`LockStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row already exists for `(board_id, object_id)`.
    #[error("Lock already held: {0}")]
    Conflict(String),

    /// The store could not be reached or timed out.
    #[error("Lock store unavailable: {0}")]
    Unavailable(String),

    #[error("Lock store error: {0}")]
    Internal(String),
}

/// Errors surfaced by a [`BroadcastChannel`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Broadcast channel closed")]
    Closed,

    #[error("Broadcast send failed: {0}")]
    Send(String),
}

/// Durable lock rows, unique on `(board_id, object_id)`.
///
/// The uniqueness constraint is the only arbiter of acquisition races.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create a row. Fails with [`StoreError::Conflict`] if one exists.
    async fn insert(&self, board_id: &str, entry: &LockEntry) -> Result<(), StoreError>;

    /// Create several rows in one request, all or nothing.
    async fn insert_many(&self, board_id: &str, entries: &[LockEntry]) -> Result<(), StoreError>;

    /// Refresh `last_active` on a row owned by `user_id`.
    ///
    /// Returns `false` when no row owned by `user_id` exists.
    async fn update(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<bool, StoreError>;

    /// Bulk variant of [`update`](Self::update). Returns rows touched.
    async fn update_many(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<u64, StoreError>;

    /// Delete a row only if owned by `user_id`. Returns whether one was removed.
    async fn delete(&self, board_id: &str, object_id: &str, user_id: &str)
        -> Result<bool, StoreError>;

    /// Bulk variant of [`delete`](Self::delete). Returns rows removed.
    async fn delete_many(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
    ) -> Result<u64, StoreError>;

    async fn select_by_board(&self, board_id: &str) -> Result<Vec<LockEntry>, StoreError>;

    async fn select_by_board_and_ids(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
    ) -> Result<Vec<LockEntry>, StoreError>;

    /// Subscribe to row changes for one board.
    async fn subscribe(&self, board_id: &str) -> Result<broadcast::Receiver<LockChange>, StoreError>;

    /// Delete every row with `last_active < cutoff`, across all boards.
    ///
    /// Returns the removed rows with their board ids.
    async fn delete_stale(
        &self,
        cutoff: EpochMillis,
    ) -> Result<Vec<(String, LockEntry)>, StoreError>;
}

/// Best-effort, at-most-once pub/sub scoped to one board.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    async fn send(&self, event: BroadcastEvent) -> Result<(), ChannelError>;

    fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent>;
}
