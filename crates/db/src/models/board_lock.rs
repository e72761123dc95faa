//! Board object lock model.

use jollyboard_core::locks::LockEntry;
use jollyboard_core::types::{EpochMillis, ObjectId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `board_object_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BoardLockRow {
    pub board_id: String,
    pub object_id: String,
    pub user_id: String,
    pub user_name: String,
    pub last_active: EpochMillis,
    pub created_at: Timestamp,
}

impl BoardLockRow {
    pub fn into_entry(self) -> LockEntry {
        LockEntry {
            object_id: self.object_id,
            user_id: self.user_id,
            user_name: self.user_name,
            last_active: self.last_active,
        }
    }
}

/// DTO for the lock rows API: the objects to acquire, refresh or release.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockIdsRequest {
    pub object_ids: Vec<ObjectId>,
}

/// Query string for listing locks, `?ids=a,b` to restrict the result.
#[derive(Debug, Default, Deserialize)]
pub struct ListLocksQuery {
    pub ids: Option<String>,
}

impl ListLocksQuery {
    /// The comma-separated id filter, or `None` for the whole board.
    pub fn object_ids(&self) -> Option<Vec<ObjectId>> {
        let ids: Vec<ObjectId> = self
            .ids
            .as_deref()?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Some(ids)
    }
}
