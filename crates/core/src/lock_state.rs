//! Per-object lock state machine, from one client's point of view.
//!
//! ```text
//! Unlocked --Select--> PendingAcquire --Granted--> Owned
//!                            |                     |   |
//!                         Refused          Refused |   | Deselect/Remove/Disconnect
//!                            v                     |   v
//!                          Denied <----------------+ Unlocked
//! ```
//!
//! `Refused` on an owned object means a refresh found our row gone (it was
//! reclaimed), so the object is treated like a lost race.
//!
//! [`transition`] is a pure reducer. [`LockTracker`] keeps the state for every
//! object plus the attempt number that put it there, so results of superseded
//! acquisitions can be recognised and dropped.

use std::collections::{HashMap, HashSet};

use crate::types::ObjectId;

/// Lock state of a single object for the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectLockState {
    #[default]
    Unlocked,
    PendingAcquire,
    Owned,
    Denied,
}

/// Inputs that drive [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSignal {
    /// The object entered the local selection.
    Select,
    /// The store confirmed our acquisition.
    Granted,
    /// The store refused, or the acquisition failed.
    Refused,
    /// The object left the local selection.
    Deselect,
    /// The object was deleted from the canvas.
    Remove,
    /// The local client is going away.
    Disconnect,
}

/// Pure state transition. Signals that make no sense in a state leave it as is.
pub fn transition(state: ObjectLockState, signal: LockSignal) -> ObjectLockState {
    use LockSignal::*;
    use ObjectLockState::*;

    match (state, signal) {
        (Unlocked | Denied, Select) => PendingAcquire,
        (Owned, Select) => Owned,
        (PendingAcquire, Granted) => Owned,
        (PendingAcquire | Owned, Refused) => Denied,
        (PendingAcquire | Owned | Denied, Deselect | Remove | Disconnect) => Unlocked,
        (state, _) => state,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tracked {
    state: ObjectLockState,
    attempt: u64,
}

/// Lock state for every object this client has touched.
///
/// Objects in the `Unlocked` state are not stored.
#[derive(Debug, Default)]
pub struct LockTracker {
    objects: HashMap<ObjectId, Tracked>,
    next_attempt: u64,
}

impl LockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, object_id: &str) -> ObjectLockState {
        self.objects
            .get(object_id)
            .map(|t| t.state)
            .unwrap_or_default()
    }

    /// Start an acquisition attempt for `ids` and return its attempt number.
    ///
    /// Objects already owned stay owned but are re-stamped with the new
    /// attempt so that a refresh result is matched to this request.
    pub fn begin_acquire(&mut self, ids: &[ObjectId]) -> u64 {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        for id in ids {
            let state = transition(self.state(id), LockSignal::Select);
            self.objects.insert(id.clone(), Tracked { state, attempt });
        }
        attempt
    }

    /// Apply the store's verdict for `attempt`.
    ///
    /// Only ids still stamped with `attempt` are affected; everything else was
    /// superseded by a later selection or released meanwhile. Returns the ids
    /// the verdict was applied to.
    pub fn finish_acquire(&mut self, ids: &[ObjectId], attempt: u64, granted: bool) -> Vec<ObjectId> {
        let signal = if granted {
            LockSignal::Granted
        } else {
            LockSignal::Refused
        };
        let mut applied = Vec::new();
        for id in ids {
            let Some(tracked) = self.objects.get_mut(id) else {
                continue;
            };
            if tracked.attempt != attempt {
                continue;
            }
            let next = transition(tracked.state, signal);
            if next != tracked.state || tracked.state == ObjectLockState::Owned {
                tracked.state = next;
                applied.push(id.clone());
            }
        }
        self.objects
            .retain(|_, t| t.state != ObjectLockState::Denied && t.state != ObjectLockState::Unlocked);
        applied
    }

    /// Apply a release-type signal (`Deselect`, `Remove`, `Disconnect`).
    ///
    /// Returns the ids that were pending or owned and therefore need a release.
    pub fn release(&mut self, ids: &[ObjectId], signal: LockSignal) -> Vec<ObjectId> {
        let mut released = Vec::new();
        for id in ids {
            if let Some(tracked) = self.objects.remove(id) {
                if transition(tracked.state, signal) == ObjectLockState::Unlocked {
                    released.push(id.clone());
                } else {
                    self.objects.insert(id.clone(), tracked);
                }
            }
        }
        released
    }

    /// Our rows for `ids` are gone from the store.
    ///
    /// Only owned ids are affected: a pending id has an acquisition queued
    /// behind the check that reported the loss. Returns the ids dropped.
    pub fn lose(&mut self, ids: &[ObjectId]) -> Vec<ObjectId> {
        let mut lost = Vec::new();
        for id in ids {
            let Some(tracked) = self.objects.get(id) else {
                continue;
            };
            if tracked.state != ObjectLockState::Owned {
                continue;
            }
            if transition(tracked.state, LockSignal::Refused) == ObjectLockState::Denied {
                self.objects.remove(id);
                lost.push(id.clone());
            }
        }
        lost
    }

    /// Ids pending or owned: the set this client must treat as its own.
    pub fn tracked_ids(&self) -> HashSet<ObjectId> {
        self.objects.keys().cloned().collect()
    }

    pub fn owned_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, t)| t.state == ObjectLockState::Owned)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drain every tracked id for teardown.
    pub fn drain(&mut self) -> Vec<ObjectId> {
        self.objects.drain().map(|(id, _)| id).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
