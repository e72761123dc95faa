//! Maps canvas selection events onto lock acquisition and release.
//!
//! [`SelectionBridge`] is synchronous: every handler updates the local lock
//! view and the canvas immediately and returns the store work still to do
//! (an [`AcquireRequest`] or a list of ids to release). The async
//! [`BridgeDriver`](crate::driver::BridgeDriver) performs that work and feeds
//! the results back through [`SelectionBridge::acquire_finished`].

use std::collections::HashSet;

use jollyboard_core::lock_state::{LockSignal, LockTracker, ObjectLockState};
use jollyboard_core::locks::{LockEntry, LockView, Participant};
use jollyboard_core::protocol::BroadcastEvent;
use jollyboard_core::types::{now_millis, ObjectId};

use crate::canvas::{Canvas, CanvasObject};
use crate::sync_utils::{apply_lock_state, get_object_id, target_object_ids};

/// A batched acquisition the driver must run against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    pub attempt: u64,
    pub ids: Vec<ObjectId>,
}

/// Result of a new local selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Nothing identifiable was selected.
    Noop,
    /// A target is locked by someone else; the selection was discarded.
    ///
    /// `release` holds ids we still had from the discarded selection.
    Rejected {
        object_id: ObjectId,
        owner: String,
        release: Vec<ObjectId>,
    },
    /// Optimistically locked; the driver must confirm with the store.
    Acquire(AcquireRequest),
}

/// Combined result of a selection change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub release: Vec<ObjectId>,
    pub outcome: SelectionOutcome,
}

/// Per-client glue between the canvas selection and the lock layer.
pub struct SelectionBridge<C: Canvas> {
    board_id: String,
    me: Participant,
    view: LockView,
    tracker: LockTracker,
    canvas: C,
}

impl<C: Canvas> SelectionBridge<C> {
    pub fn new(board_id: impl Into<String>, me: Participant, canvas: C) -> Self {
        Self {
            board_id: board_id.into(),
            me,
            view: LockView::new(),
            tracker: LockTracker::new(),
            canvas,
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn me(&self) -> &Participant {
        &self.me
    }

    pub fn view(&self) -> &LockView {
        &self.view
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn into_canvas(self) -> C {
        self.canvas
    }

    pub fn state(&self, object_id: &str) -> ObjectLockState {
        self.tracker.state(object_id)
    }

    /// Ids this client currently treats as its own (pending or owned).
    pub fn owned_ids(&self) -> Vec<ObjectId> {
        self.tracker.owned_ids()
    }

    /// A selection was created on the local canvas.
    pub fn selection_created(&mut self, selected: &[CanvasObject]) -> SelectionOutcome {
        let ids = target_object_ids(selected);
        if ids.is_empty() {
            return SelectionOutcome::Noop;
        }

        if let Some(held) = ids
            .iter()
            .find_map(|id| self.view.locked_by_other(id, &self.me.user_id))
        {
            let (object_id, owner) = (held.object_id.clone(), held.user_id.clone());
            tracing::debug!(board_id = %self.board_id, object_id = %object_id, owner = %owner, "Selection rejected, object locked");
            let release = self.drop_selection();
            return SelectionOutcome::Rejected {
                object_id,
                owner,
                release,
            };
        }

        self.view.add_optimistic(&ids, &self.me, now_millis());
        let attempt = self.tracker.begin_acquire(&ids);
        self.refresh_interactivity();
        SelectionOutcome::Acquire(AcquireRequest { attempt, ids })
    }

    /// The store answered an acquisition started by [`selection_created`].
    ///
    /// Only ids still stamped with the request's attempt are affected.
    /// Returns ids the driver must release: rows granted for objects no longer
    /// selected, or after a refusal our stale rows plus everything else the
    /// discarded selection held.
    ///
    /// [`selection_created`]: Self::selection_created
    pub fn acquire_finished(&mut self, request: &AcquireRequest, granted: bool) -> Vec<ObjectId> {
        let applied = self
            .tracker
            .finish_acquire(&request.ids, request.attempt, granted);

        if granted {
            // Granted after the selection moved on: the rows are orphans.
            return request
                .ids
                .iter()
                .filter(|id| self.tracker.state(id) == ObjectLockState::Unlocked)
                .cloned()
                .collect();
        }

        if applied.is_empty() {
            return Vec::new();
        }

        tracing::debug!(board_id = %self.board_id, count = applied.len(), "Acquire refused, rolling back selection");
        self.view.strip(&applied, &self.me.user_id);
        let mut release = applied;
        release.extend(self.drop_selection());
        release
    }

    /// The store no longer holds our rows for `ids`.
    ///
    /// Owned ids among them are rolled back like a refused acquisition and
    /// the selection is discarded. Returns the remaining ids to release.
    pub fn locks_lost(&mut self, ids: &[ObjectId]) -> Vec<ObjectId> {
        let lost = self.tracker.lose(ids);
        if lost.is_empty() {
            return Vec::new();
        }
        tracing::warn!(board_id = %self.board_id, count = lost.len(), "Held locks were reclaimed, discarding selection");
        self.view.strip(&lost, &self.me.user_id);
        self.drop_selection()
    }

    /// Owned ids a peer event or snapshot says we may no longer hold.
    ///
    /// A `lock_released` naming us for an object we still own means someone
    /// else (the reclamation job) deleted our row. The driver confirms with
    /// the store before calling [`locks_lost`](Self::locks_lost).
    pub fn suspect_release(&self, event: &BroadcastEvent) -> Vec<ObjectId> {
        match event {
            BroadcastEvent::LockReleased { user_id, .. } if *user_id == self.me.user_id => {
                let owned: HashSet<ObjectId> = self.tracker.owned_ids().into_iter().collect();
                event
                    .object_ids()
                    .into_iter()
                    .filter(|id| owned.contains(id))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Owned ids with no row of ours in `rows`.
    pub fn suspect_snapshot(&self, rows: &[LockEntry]) -> Vec<ObjectId> {
        let ours: HashSet<&str> = rows
            .iter()
            .filter(|row| row.user_id == self.me.user_id)
            .map(|row| row.object_id.as_str())
            .collect();
        self.tracker
            .owned_ids()
            .into_iter()
            .filter(|id| !ours.contains(id.as_str()))
            .collect()
    }

    /// Objects left the local selection. Returns ids to release.
    pub fn selection_cleared(&mut self, deselected: &[CanvasObject]) -> Vec<ObjectId> {
        let ids = target_object_ids(deselected);
        self.forget(&ids, LockSignal::Deselect)
    }

    /// The selection changed from one set of objects to another.
    pub fn selection_updated(
        &mut self,
        selected: &[CanvasObject],
        deselected: &[CanvasObject],
    ) -> SelectionChange {
        let release = self.selection_cleared(deselected);
        let outcome = self.selection_created(selected);
        SelectionChange { release, outcome }
    }

    /// An object was deleted from the canvas. Returns ids to release.
    pub fn object_removed(&mut self, object: &CanvasObject) -> Vec<ObjectId> {
        let Some(id) = get_object_id(object) else {
            return Vec::new();
        };
        self.forget(&[id.to_string()], LockSignal::Remove)
    }

    /// A fresh store snapshot arrived. Our tracked ids always win over it.
    ///
    /// Returns `true` when the view changed.
    pub fn snapshot_received(&mut self, rows: Vec<LockEntry>) -> bool {
        let own = self.tracker.tracked_ids();
        let changed = self
            .view
            .merge_snapshot(rows, &own, &self.me, now_millis());
        if changed {
            self.refresh_interactivity();
        }
        changed
    }

    /// A peer broadcast arrived. Returns `true` when the view changed.
    pub fn broadcast_received(&mut self, event: &BroadcastEvent) -> bool {
        let changed = self.view.apply_broadcast(event, &self.me.user_id);
        if changed {
            tracing::debug!(board_id = %self.board_id, from = %event.user_id(), "Applied peer lock broadcast");
            self.refresh_interactivity();
        }
        changed
    }

    /// The client is going away. Returns every pending or owned id.
    pub fn teardown(&mut self) -> Vec<ObjectId> {
        let ids = self.tracker.drain();
        self.view.strip(&ids, &self.me.user_id);
        self.refresh_interactivity();
        ids
    }

    fn forget(&mut self, ids: &[ObjectId], signal: LockSignal) -> Vec<ObjectId> {
        if ids.is_empty() {
            return Vec::new();
        }
        let released = self.tracker.release(ids, signal);
        if self.view.strip(ids, &self.me.user_id) > 0 {
            self.refresh_interactivity();
        }
        released
    }

    /// Discard the canvas selection and forget everything it held.
    ///
    /// The canvas fires no deselection events for a discard, so tracked ids
    /// are released here.
    fn drop_selection(&mut self) -> Vec<ObjectId> {
        let tracked: Vec<ObjectId> = self.tracker.tracked_ids().into_iter().collect();
        let released = self.forget(&tracked, LockSignal::Deselect);
        self.canvas.discard_active_selection();
        self.refresh_interactivity();
        released
    }

    fn refresh_interactivity(&mut self) {
        apply_lock_state(self.canvas.objects_mut(), &self.view, &self.me.user_id);
        self.canvas.request_render();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
