//! Lock acquisition and release against the durable store.
//!
//! The store's uniqueness constraint on `(board_id, object_id)` decides every
//! race. After a successful write the client publishes one broadcast event so
//! peers update without waiting for the change feed.
//!
//! Acquisition is fail-safe: any store error is reported as `false` and the
//! object must be treated as unavailable.

use std::collections::HashSet;
use std::sync::Arc;

use jollyboard_core::collaboration::DEFAULT_INSERT_CHUNK_SIZE;
use jollyboard_core::locks::LockEntry;
use jollyboard_core::protocol::{BroadcastEvent, LockChange};
use jollyboard_core::store::{BroadcastChannel, LockStore, StoreError};
use jollyboard_core::types::{now_millis, EpochMillis, ObjectId};
use tokio::sync::broadcast;

/// Tunables for [`LockClient`].
#[derive(Debug, Clone)]
pub struct LockClientConfig {
    /// Maximum rows per insert request in a batched acquire.
    pub insert_chunk_size: usize,
}

impl Default for LockClientConfig {
    fn default() -> Self {
        Self {
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        }
    }
}

/// Acquires and releases object locks for one board's channel.
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn LockStore>,
    channel: Arc<dyn BroadcastChannel>,
    config: LockClientConfig,
}

impl LockClient {
    pub fn new(store: Arc<dyn LockStore>, channel: Arc<dyn BroadcastChannel>) -> Self {
        Self::with_config(store, channel, LockClientConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn LockStore>,
        channel: Arc<dyn BroadcastChannel>,
        config: LockClientConfig,
    ) -> Self {
        Self {
            store,
            channel,
            config,
        }
    }

    pub fn config(&self) -> &LockClientConfig {
        &self.config
    }

    /// Try to lock a single object for `user_id`.
    ///
    /// Returns `true` only if the caller now durably owns the lock.
    pub async fn acquire_lock(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> bool {
        let now = now_millis();
        match self
            .try_acquire_one(board_id, object_id, user_id, user_name, now)
            .await
        {
            Ok(true) => {
                self.announce(BroadcastEvent::acquired(
                    &[object_id.to_string()],
                    user_id,
                    user_name,
                    now,
                ))
                .await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(board_id, object_id, user_id, error = %e, "Lock acquire failed, treating as denied");
                false
            }
        }
    }

    async fn try_acquire_one(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
        user_name: &str,
        now: EpochMillis,
    ) -> Result<bool, StoreError> {
        let existing = self
            .store
            .select_by_board_and_ids(board_id, &[object_id.to_string()])
            .await?;

        match existing.first() {
            Some(row) if row.user_id != user_id => {
                tracing::debug!(board_id, object_id, owner = %row.user_id, "Object locked by another user");
                Ok(false)
            }
            // Stale row from an earlier session of ours.
            Some(_) => self.store.update(board_id, object_id, user_id, now).await,
            None => {
                let entry = LockEntry::new(object_id, user_id, user_name, now);
                match self.store.insert(board_id, &entry).await {
                    Ok(()) => Ok(true),
                    Err(StoreError::Conflict(reason)) => {
                        tracing::debug!(board_id, object_id, %reason, "Lost lock race");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Release a single object lock held by `user_id`.
    ///
    /// Always publishes `lock_released` so peers drop any entry they kept.
    pub async fn release_lock(&self, board_id: &str, object_id: &str, user_id: &str) {
        if let Err(e) = self.try_release_one(board_id, object_id, user_id).await {
            tracing::warn!(board_id, object_id, user_id, error = %e, "Lock release failed");
        }
        self.announce(BroadcastEvent::released(&[object_id.to_string()], user_id))
            .await;
    }

    async fn try_release_one(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let existing = self
            .store
            .select_by_board_and_ids(board_id, &[object_id.to_string()])
            .await?;
        if existing.iter().any(|row| row.user_id == user_id) {
            self.store.delete(board_id, object_id, user_id).await?;
        }
        Ok(())
    }

    /// Try to lock every object in `object_ids` for `user_id`, all or nothing.
    ///
    /// On success exactly one `lock_acquired` carrying the full id list is
    /// published. Rows inserted before a failing chunk are deleted again;
    /// rows that were already ours are left for the caller to release.
    pub async fn acquire_locks_batch(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
        user_name: &str,
    ) -> bool {
        let ids = dedup(object_ids);
        if ids.is_empty() {
            return true;
        }

        let now = now_millis();
        match self
            .try_acquire_many(board_id, &ids, user_id, user_name, now)
            .await
        {
            Ok(true) => {
                self.announce(BroadcastEvent::acquired(&ids, user_id, user_name, now))
                    .await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(board_id, count = ids.len(), user_id, error = %e, "Batch lock acquire failed, treating as denied");
                false
            }
        }
    }

    async fn try_acquire_many(
        &self,
        board_id: &str,
        ids: &[ObjectId],
        user_id: &str,
        user_name: &str,
        now: EpochMillis,
    ) -> Result<bool, StoreError> {
        let existing = self.store.select_by_board_and_ids(board_id, ids).await?;

        if let Some(row) = existing.iter().find(|row| row.user_id != user_id) {
            tracing::debug!(board_id, object_id = %row.object_id, owner = %row.user_id, "Batch blocked by foreign lock");
            return Ok(false);
        }

        let refresh: Vec<ObjectId> = existing.into_iter().map(|row| row.object_id).collect();
        let refresh_set: HashSet<&ObjectId> = refresh.iter().collect();
        let insert: Vec<LockEntry> = ids
            .iter()
            .filter(|id| !refresh_set.contains(id))
            .map(|id| LockEntry::new(id.clone(), user_id, user_name, now))
            .collect();

        if !refresh.is_empty() {
            let touched = self
                .store
                .update_many(board_id, &refresh, user_id, now)
                .await?;
            if touched < refresh.len() as u64 {
                tracing::debug!(board_id, touched, expected = refresh.len(), "Stale locks vanished during refresh");
                return Ok(false);
            }
        }

        let chunk_size = self.config.insert_chunk_size.max(1);
        let mut inserted: Vec<ObjectId> = Vec::with_capacity(insert.len());
        for chunk in insert.chunks(chunk_size) {
            match self.store.insert_many(board_id, chunk).await {
                Ok(()) => inserted.extend(chunk.iter().map(|e| e.object_id.clone())),
                Err(e) => {
                    self.compensate(board_id, &inserted, user_id).await;
                    return match e {
                        StoreError::Conflict(reason) => {
                            tracing::debug!(board_id, %reason, "Lost batch lock race");
                            Ok(false)
                        }
                        other => Err(other),
                    };
                }
            }
        }

        Ok(true)
    }

    /// Undo the inserts of a failed batch attempt.
    async fn compensate(&self, board_id: &str, inserted: &[ObjectId], user_id: &str) {
        if inserted.is_empty() {
            return;
        }
        match self.store.delete_many(board_id, inserted, user_id).await {
            Ok(removed) => {
                tracing::debug!(board_id, removed, "Rolled back partial batch acquire");
            }
            Err(e) => {
                tracing::error!(board_id, count = inserted.len(), error = %e, "Failed to roll back partial batch acquire");
            }
        }
    }

    /// Release every lock in `object_ids` held by `user_id`.
    ///
    /// One bulk delete and one `lock_released` carrying the full id list.
    pub async fn release_locks_batch(&self, board_id: &str, object_ids: &[ObjectId], user_id: &str) {
        let ids = dedup(object_ids);
        if ids.is_empty() {
            return;
        }
        match self.store.delete_many(board_id, &ids, user_id).await {
            Ok(removed) => {
                tracing::debug!(board_id, removed, requested = ids.len(), "Released locks");
            }
            Err(e) => {
                tracing::warn!(board_id, count = ids.len(), user_id, error = %e, "Batch lock release failed");
            }
        }
        self.announce(BroadcastEvent::released(&ids, user_id)).await;
    }

    /// Refresh `last_active` on locks `user_id` believes it holds.
    ///
    /// Returns the ids whose rows are no longer ours (reclaimed, or taken by
    /// someone else since). A store error reports nothing lost: the rows
    /// may well still be there and the next refresh will tell.
    pub async fn refresh_locks(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
    ) -> Vec<ObjectId> {
        let ids = dedup(object_ids);
        if ids.is_empty() {
            return Vec::new();
        }
        match self.try_refresh(board_id, &ids, user_id).await {
            Ok(lost) => {
                if !lost.is_empty() {
                    tracing::warn!(board_id, user_id, lost = lost.len(), "Held locks vanished from the store");
                }
                lost
            }
            Err(e) => {
                tracing::warn!(board_id, count = ids.len(), user_id, error = %e, "Lock refresh failed");
                Vec::new()
            }
        }
    }

    async fn try_refresh(
        &self,
        board_id: &str,
        ids: &[ObjectId],
        user_id: &str,
    ) -> Result<Vec<ObjectId>, StoreError> {
        let touched = self
            .store
            .update_many(board_id, ids, user_id, now_millis())
            .await?;
        if touched >= ids.len() as u64 {
            return Ok(Vec::new());
        }

        let rows = self.store.select_by_board_and_ids(board_id, ids).await?;
        let held: HashSet<&str> = rows
            .iter()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.object_id.as_str())
            .collect();
        Ok(ids
            .iter()
            .filter(|id| !held.contains(id.as_str()))
            .cloned()
            .collect())
    }

    /// Snapshot of every lock row on the board.
    pub async fn fetch_locks(&self, board_id: &str) -> Result<Vec<LockEntry>, StoreError> {
        self.store.select_by_board(board_id).await
    }

    /// Subscribe to the board's broadcast channel.
    pub fn subscribe_broadcasts(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.channel.subscribe()
    }

    /// Subscribe to the store's change feed for a board.
    pub async fn subscribe_changes(
        &self,
        board_id: &str,
    ) -> Result<broadcast::Receiver<LockChange>, StoreError> {
        self.store.subscribe(board_id).await
    }

    async fn announce(&self, event: Option<BroadcastEvent>) {
        let Some(event) = event else {
            return;
        };
        if let Err(e) = self.channel.send(event).await {
            tracing::warn!(error = %e, "Failed to publish lock broadcast");
        }
    }
}

fn dedup(ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(ids.len());
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id) {
            out.push(id.clone());
        }
    }
    out
}
