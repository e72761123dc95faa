//! In-memory [`LockStore`] for headless clients and tests.
//!
//! Enforces the same `(board_id, object_id)` uniqueness and owner-only
//! mutation rules as the Postgres store, and emits the same change feed.

use std::collections::HashMap;

use async_trait::async_trait;
use jollyboard_core::locks::LockEntry;
use jollyboard_core::protocol::{ChangeKind, LockChange};
use jollyboard_core::store::{LockStore, StoreError};
use jollyboard_core::types::{EpochMillis, ObjectId};
use tokio::sync::{broadcast, Mutex};

const FEED_CAPACITY: usize = 256;

type RowKey = (String, ObjectId);

#[derive(Default)]
struct Inner {
    rows: HashMap<RowKey, LockEntry>,
    /// Insertion sequence so snapshots come back in a stable order.
    order: HashMap<RowKey, u64>,
    seq: u64,
    feeds: HashMap<String, broadcast::Sender<LockChange>>,
}

impl Inner {
    fn notify(&mut self, kind: ChangeKind, board_id: &str, entry: &LockEntry) {
        if let Some(sender) = self.feeds.get(board_id) {
            let _ = sender.send(LockChange {
                kind,
                board_id: board_id.to_string(),
                object_id: entry.object_id.clone(),
                user_id: entry.user_id.clone(),
            });
        }
    }

    fn put(&mut self, board_id: &str, entry: &LockEntry) {
        let key = (board_id.to_string(), entry.object_id.clone());
        self.seq += 1;
        self.order.insert(key.clone(), self.seq);
        self.rows.insert(key, entry.clone());
        self.notify(ChangeKind::Insert, board_id, entry);
    }

    fn take(&mut self, key: &RowKey) -> Option<LockEntry> {
        self.order.remove(key);
        let entry = self.rows.remove(key)?;
        self.notify(ChangeKind::Delete, &key.0, &entry);
        Some(entry)
    }

    fn touch(&mut self, key: &RowKey, user_id: &str, last_active: EpochMillis) -> bool {
        let Some(entry) = self.rows.get_mut(key) else {
            return false;
        };
        if entry.user_id != user_id {
            return false;
        }
        entry.last_active = last_active;
        let entry = entry.clone();
        self.notify(ChangeKind::Update, &key.0, &entry);
        true
    }

    fn sorted(&self, mut rows: Vec<(&RowKey, &LockEntry)>) -> Vec<LockEntry> {
        rows.sort_by_key(|(key, _)| self.order.get(*key).copied().unwrap_or_default());
        rows.into_iter().map(|(_, entry)| entry.clone()).collect()
    }
}

fn key(board_id: &str, object_id: &str) -> RowKey {
    (board_id.to_string(), object_id.to_string())
}

/// Lock rows held in process memory.
#[derive(Default)]
pub struct MemoryLockStore {
    inner: Mutex<Inner>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all boards.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn insert(&self, board_id: &str, entry: &LockEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.rows.contains_key(&key(board_id, &entry.object_id)) {
            return Err(StoreError::Conflict(format!(
                "{board_id}/{} is already locked",
                entry.object_id
            )));
        }
        inner.put(board_id, entry);
        Ok(())
    }

    async fn insert_many(&self, board_id: &str, entries: &[LockEntry]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(taken) = entries
            .iter()
            .find(|e| inner.rows.contains_key(&key(board_id, &e.object_id)))
        {
            return Err(StoreError::Conflict(format!(
                "{board_id}/{} is already locked",
                taken.object_id
            )));
        }
        for entry in entries {
            inner.put(board_id, entry);
        }
        Ok(())
    }

    async fn update(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.touch(&key(board_id, object_id), user_id, last_active))
    }

    async fn update_many(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
        last_active: EpochMillis,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let touched = object_ids
            .iter()
            .filter(|id| inner.touch(&key(board_id, id), user_id, last_active))
            .count();
        Ok(touched as u64)
    }

    async fn delete(
        &self,
        board_id: &str,
        object_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = key(board_id, object_id);
        match inner.rows.get(&key) {
            Some(entry) if entry.user_id == user_id => Ok(inner.take(&key).is_some()),
            _ => Ok(false),
        }
    }

    async fn delete_many(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
        user_id: &str,
    ) -> Result<u64, StoreError> {
        let mut removed = 0;
        for object_id in object_ids {
            if self.delete(board_id, object_id, user_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn select_by_board(&self, board_id: &str) -> Result<Vec<LockEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let rows = inner
            .rows
            .iter()
            .filter(|((board, _), _)| board == board_id)
            .collect();
        Ok(inner.sorted(rows))
    }

    async fn select_by_board_and_ids(
        &self,
        board_id: &str,
        object_ids: &[ObjectId],
    ) -> Result<Vec<LockEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let rows = inner
            .rows
            .iter()
            .filter(|((board, object), _)| board == board_id && object_ids.contains(object))
            .collect();
        Ok(inner.sorted(rows))
    }

    async fn subscribe(&self, board_id: &str) -> Result<broadcast::Receiver<LockChange>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .feeds
            .entry(board_id.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe())
    }

    async fn delete_stale(
        &self,
        cutoff: EpochMillis,
    ) -> Result<Vec<(String, LockEntry)>, StoreError> {
        let mut inner = self.inner.lock().await;
        let stale: Vec<RowKey> = inner
            .rows
            .iter()
            .filter(|(_, entry)| entry.last_active < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(stale
            .into_iter()
            .filter_map(|key| {
                let board_id = key.0.clone();
                inner.take(&key).map(|entry| (board_id, entry))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
