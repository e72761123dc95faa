//! Async event loop that owns a [`SelectionBridge`] and performs its store I/O.
//!
//! Store writes go through a single writer task so they hit the store in the
//! order the user produced them (a release never overtakes the acquisition it
//! undoes). Snapshot reads run in a [`JoinSet`]; change notifications that
//! arrive while a read is in flight are coalesced into one follow-up read.
//!
//! Results of superseded acquisitions are filtered by the bridge's attempt
//! check, not by cancelling the request.
//!
//! While objects stay selected the driver refreshes their rows on a timer so
//! the server's reclamation sweep leaves them alone. The same refresh is run
//! on demand when a broadcast or snapshot suggests a row of ours is gone; if
//! the store confirms it, the selection is rolled back.

use std::time::Duration;

use jollyboard_core::collaboration::LOCK_REFRESH_INTERVAL_SECS;
use jollyboard_core::locks::LockEntry;
use jollyboard_core::store::StoreError;
use jollyboard_core::types::ObjectId;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bridge::{AcquireRequest, SelectionBridge, SelectionOutcome};
use crate::canvas::{Canvas, CanvasObject};
use crate::client::LockClient;

/// Selection and lifecycle events emitted by the canvas engine.
#[derive(Debug, Clone)]
pub enum CanvasEvent {
    SelectionCreated(Vec<CanvasObject>),
    SelectionUpdated {
        selected: Vec<CanvasObject>,
        deselected: Vec<CanvasObject>,
    },
    SelectionCleared(Vec<CanvasObject>),
    ObjectRemoved(CanvasObject),
}

#[derive(Debug)]
enum StoreOp {
    Acquire(AcquireRequest),
    Release(Vec<ObjectId>),
    /// Refresh rows we believe we hold and report the ones that are gone.
    Refresh(Vec<ObjectId>),
}

#[derive(Debug)]
enum WriteResult {
    Acquired {
        request: AcquireRequest,
        granted: bool,
    },
    Lost(Vec<ObjectId>),
}

type SnapshotResult = Result<Vec<LockEntry>, StoreError>;

/// Per-run I/O plumbing.
struct Io {
    ops: mpsc::UnboundedSender<StoreOp>,
    snapshots: JoinSet<SnapshotResult>,
    snapshot_stale: bool,
}

pub struct BridgeDriver<C: Canvas> {
    bridge: SelectionBridge<C>,
    client: LockClient,
    refresh_every: Duration,
}

impl<C: Canvas> BridgeDriver<C> {
    pub fn new(bridge: SelectionBridge<C>, client: LockClient) -> Self {
        Self {
            bridge,
            client,
            refresh_every: Duration::from_secs(LOCK_REFRESH_INTERVAL_SECS),
        }
    }

    /// Override how often held locks are refreshed. Keep it under half the
    /// server's reclamation TTL.
    pub fn with_refresh_interval(mut self, every: Duration) -> Self {
        self.refresh_every = every.max(Duration::from_millis(1));
        self
    }

    /// Run until `cancel` fires or the canvas event stream ends.
    ///
    /// On exit every pending or owned lock is released and the bridge is
    /// handed back.
    pub async fn run(
        mut self,
        mut canvas_events: mpsc::Receiver<CanvasEvent>,
        cancel: CancellationToken,
    ) -> SelectionBridge<C> {
        let board_id = self.bridge.board_id().to_string();

        let mut broadcasts = Some(self.client.subscribe_broadcasts());
        let mut changes = match self.client.subscribe_changes(&board_id).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                tracing::warn!(board_id = %board_id, error = %e, "Lock change feed unavailable, relying on broadcasts");
                None
            }
        };

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(
            self.client.clone(),
            board_id.clone(),
            self.bridge.me().clone(),
            ops_rx,
            done_tx,
        ));

        let mut io = Io {
            ops: ops_tx,
            snapshots: JoinSet::new(),
            snapshot_stale: false,
        };
        self.request_snapshot(&mut io);

        let mut refresh =
            tokio::time::interval_at(Instant::now() + self.refresh_every, self.refresh_every);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(board_id = %board_id, user_id = %self.bridge.me().user_id, "Bridge driver started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = canvas_events.recv() => match event {
                    Some(event) => self.on_canvas_event(event, &mut io),
                    None => break,
                },
                msg = recv_or_pending(&mut broadcasts) => match msg {
                    Ok(event) => {
                        submit_refresh(&io, self.bridge.suspect_release(&event));
                        self.bridge.broadcast_received(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(board_id = %board_id, skipped, "Broadcast receiver lagged, refetching locks");
                        self.request_snapshot(&mut io);
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!(board_id = %board_id, "Broadcast channel closed");
                        broadcasts = None;
                    }
                },
                msg = recv_or_pending(&mut changes) => match msg {
                    Ok(change) => {
                        tracing::debug!(board_id = %board_id, object_id = %change.object_id, kind = ?change.kind, "Lock row changed");
                        self.request_snapshot(&mut io);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(board_id = %board_id, skipped, "Change feed lagged, refetching locks");
                        self.request_snapshot(&mut io);
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!(board_id = %board_id, "Lock change feed closed");
                        changes = None;
                    }
                },
                Some(result) = done_rx.recv() => self.on_write_result(result, &mut io),
                Some(joined) = io.snapshots.join_next() => self.on_snapshot(joined, &mut io),
                _ = refresh.tick() => submit_refresh(&io, self.bridge.owned_ids()),
            }
        }

        self.shutdown(io, writer, done_rx).await
    }

    fn on_canvas_event(&mut self, event: CanvasEvent, io: &mut Io) {
        match event {
            CanvasEvent::SelectionCreated(selected) => {
                let outcome = self.bridge.selection_created(&selected);
                submit_outcome(io, outcome);
            }
            CanvasEvent::SelectionUpdated {
                selected,
                deselected,
            } => {
                let change = self.bridge.selection_updated(&selected, &deselected);
                submit_release(io, change.release);
                submit_outcome(io, change.outcome);
            }
            CanvasEvent::SelectionCleared(deselected) => {
                let release = self.bridge.selection_cleared(&deselected);
                submit_release(io, release);
            }
            CanvasEvent::ObjectRemoved(object) => {
                let release = self.bridge.object_removed(&object);
                submit_release(io, release);
            }
        }
    }

    fn on_write_result(&mut self, result: WriteResult, io: &mut Io) {
        match result {
            WriteResult::Acquired { request, granted } => {
                let release = self.bridge.acquire_finished(&request, granted);
                submit_release(io, release);
                if !granted {
                    // Rolled back optimistically; pick up whoever won.
                    self.request_snapshot(io);
                }
            }
            WriteResult::Lost(ids) => {
                let release = self.bridge.locks_lost(&ids);
                submit_release(io, release);
                self.request_snapshot(io);
            }
        }
    }

    fn on_snapshot(&mut self, joined: Result<SnapshotResult, JoinError>, io: &mut Io) {
        match joined {
            Ok(Ok(rows)) => {
                submit_refresh(io, self.bridge.suspect_snapshot(&rows));
                self.bridge.snapshot_received(rows);
            }
            Ok(Err(e)) => {
                tracing::warn!(board_id = %self.bridge.board_id(), error = %e, "Lock snapshot failed");
            }
            Err(e) => {
                tracing::error!(board_id = %self.bridge.board_id(), error = %e, "Lock snapshot task panicked");
            }
        }
        if std::mem::take(&mut io.snapshot_stale) {
            self.request_snapshot(io);
        }
    }

    fn request_snapshot(&self, io: &mut Io) {
        if !io.snapshots.is_empty() {
            io.snapshot_stale = true;
            return;
        }
        let client = self.client.clone();
        let board_id = self.bridge.board_id().to_string();
        io.snapshots
            .spawn(async move { client.fetch_locks(&board_id).await });
    }

    async fn shutdown(
        mut self,
        io: Io,
        writer: tokio::task::JoinHandle<()>,
        mut done_rx: mpsc::UnboundedReceiver<WriteResult>,
    ) -> SelectionBridge<C> {
        let Io {
            ops, mut snapshots, ..
        } = io;
        snapshots.abort_all();

        let release = self.bridge.teardown();
        let count = release.len();
        if !release.is_empty() {
            let _ = ops.send(StoreOp::Release(release));
        }
        drop(ops);

        if let Err(e) = writer.await {
            tracing::error!(board_id = %self.bridge.board_id(), error = %e, "Lock writer task panicked");
        }

        // Acquisitions that completed after teardown started.
        let me = self.bridge.me().clone();
        while let Ok(result) = done_rx.try_recv() {
            let WriteResult::Acquired { request, granted } = result else {
                continue;
            };
            let orphans = self.bridge.acquire_finished(&request, granted);
            if !orphans.is_empty() {
                self.client
                    .release_locks_batch(self.bridge.board_id(), &orphans, &me.user_id)
                    .await;
            }
        }

        tracing::info!(board_id = %self.bridge.board_id(), released = count, "Bridge driver stopped");
        self.bridge
    }
}

fn submit_outcome(io: &Io, outcome: SelectionOutcome) {
    match outcome {
        SelectionOutcome::Acquire(request) => {
            let _ = io.ops.send(StoreOp::Acquire(request));
        }
        SelectionOutcome::Rejected { release, .. } => submit_release(io, release),
        SelectionOutcome::Noop => {}
    }
}

fn submit_release(io: &Io, ids: Vec<ObjectId>) {
    if !ids.is_empty() {
        let _ = io.ops.send(StoreOp::Release(ids));
    }
}

fn submit_refresh(io: &Io, ids: Vec<ObjectId>) {
    if !ids.is_empty() {
        let _ = io.ops.send(StoreOp::Refresh(ids));
    }
}

/// Executes store writes one at a time, in submission order.
async fn run_writer(
    client: LockClient,
    board_id: String,
    me: jollyboard_core::locks::Participant,
    mut ops: mpsc::UnboundedReceiver<StoreOp>,
    done: mpsc::UnboundedSender<WriteResult>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            StoreOp::Acquire(request) => {
                let granted = client
                    .acquire_locks_batch(&board_id, &request.ids, &me.user_id, &me.user_name)
                    .await;
                tracing::debug!(board_id = %board_id, attempt = request.attempt, count = request.ids.len(), granted, "Acquire finished");
                let _ = done.send(WriteResult::Acquired { request, granted });
            }
            StoreOp::Release(ids) => {
                client
                    .release_locks_batch(&board_id, &ids, &me.user_id)
                    .await;
            }
            StoreOp::Refresh(ids) => {
                let lost = client.refresh_locks(&board_id, &ids, &me.user_id).await;
                if !lost.is_empty() {
                    let _ = done.send(WriteResult::Lost(lost));
                }
            }
        }
    }
}

/// Receive from an optional subscription; a missing one never resolves.
async fn recv_or_pending<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
