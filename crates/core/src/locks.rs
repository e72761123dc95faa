//! Lock entries and the client-local merged lock view.
//!
//! [`LockView`] is the in-memory picture a client keeps of who holds what on a
//! board. It is rebuilt from three sources: durable store snapshots, the
//! client's own optimistic entries, and peer broadcast deltas. Entries the
//! client tracks as its own always win over a snapshot that has not caught up.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::protocol::BroadcastEvent;
use crate::types::{EpochMillis, ObjectId, UserId};

/// One held lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub object_id: ObjectId,
    pub user_id: UserId,
    /// Denormalized display name for presence hints.
    pub user_name: String,
    pub last_active: EpochMillis,
}

impl LockEntry {
    pub fn new(
        object_id: impl Into<ObjectId>,
        user_id: impl Into<UserId>,
        user_name: impl Into<String>,
        last_active: EpochMillis,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            last_active,
        }
    }
}

/// The identity of the local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub user_name: String,
}

impl Participant {
    pub fn new(user_id: impl Into<UserId>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// Insertion-ordered lock view keyed by object id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockView {
    entries: IndexMap<ObjectId, LockEntry>,
}

impl LockView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = LockEntry>) -> Self {
        let mut view = Self::new();
        for entry in entries {
            view.entries.insert(entry.object_id.clone(), entry);
        }
        view
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, object_id: &str) -> Option<&LockEntry> {
        self.entries.get(object_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockEntry> {
        self.entries.values()
    }

    /// The entry for `object_id` when it is held by anyone other than `self_id`.
    pub fn locked_by_other(&self, object_id: &str, self_id: &str) -> Option<&LockEntry> {
        self.entries
            .get(object_id)
            .filter(|entry| entry.user_id != self_id)
    }

    /// Whether any of `ids` is held by someone other than `self_id`.
    pub fn any_locked_by_other<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ObjectId>,
        self_id: &str,
    ) -> bool {
        ids.into_iter()
            .any(|id| self.locked_by_other(id, self_id).is_some())
    }

    /// Record `ids` as owned by `owner`, overwriting prior entries.
    pub fn add_optimistic(&mut self, ids: &[ObjectId], owner: &Participant, now: EpochMillis) {
        for id in ids {
            self.entries.insert(
                id.clone(),
                LockEntry::new(id.clone(), owner.user_id.clone(), owner.user_name.clone(), now),
            );
        }
    }

    /// Remove entries for `ids` that are held by `user_id`.
    ///
    /// Returns the number of entries removed.
    pub fn strip(&mut self, ids: &[ObjectId], user_id: &str) -> usize {
        let before = self.entries.len();
        for id in ids {
            if self
                .entries
                .get(id)
                .is_some_and(|entry| entry.user_id == user_id)
            {
                self.entries.shift_remove(id);
            }
        }
        before - self.entries.len()
    }

    /// Replace the view with a store snapshot, keeping `own_ids` as ours.
    ///
    /// For every id in `own_ids` the previous self-owned entry survives (or one
    /// is synthesized at `now`) regardless of what the snapshot says, so a
    /// lagging read can never clobber a lock this client is tracking.
    /// Returns `true` when the view changed.
    pub fn merge_snapshot(
        &mut self,
        snapshot: Vec<LockEntry>,
        own_ids: &HashSet<ObjectId>,
        me: &Participant,
        now: EpochMillis,
    ) -> bool {
        let mut merged: IndexMap<ObjectId, LockEntry> = snapshot
            .into_iter()
            .filter(|entry| !own_ids.contains(&entry.object_id))
            .map(|entry| (entry.object_id.clone(), entry))
            .collect();

        for id in own_ids {
            let ours = match self.entries.get(id) {
                Some(entry) if entry.user_id == me.user_id => entry.clone(),
                _ => LockEntry::new(id.clone(), me.user_id.clone(), me.user_name.clone(), now),
            };
            merged.insert(id.clone(), ours);
        }

        if merged == self.entries {
            return false;
        }
        self.entries = merged;
        true
    }

    /// Apply a peer broadcast event. Self-originated events are ignored.
    ///
    /// Returns `true` when the view changed.
    pub fn apply_broadcast(&mut self, event: &BroadcastEvent, self_id: &str) -> bool {
        if event.user_id() == self_id {
            return false;
        }
        match event {
            BroadcastEvent::LockAcquired {
                user_id,
                user_name,
                last_active,
                ..
            } => {
                let mut changed = false;
                for id in event.object_ids() {
                    let entry = LockEntry::new(id.clone(), user_id.clone(), user_name.clone(), *last_active);
                    if self.entries.get(&id) != Some(&entry) {
                        self.entries.insert(id, entry);
                        changed = true;
                    }
                }
                changed
            }
            BroadcastEvent::LockReleased { user_id, .. } => {
                self.strip(&event.object_ids(), user_id) > 0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
