//! Scenario tests for the selection bridge and its driver.
//!
//! Two or more simulated clients share one in-memory store and one board
//! channel, the same way browser peers share the hosted backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jollyboard_core::lock_state::ObjectLockState;
use jollyboard_core::locks::{LockEntry, Participant};
use jollyboard_core::protocol::BroadcastEvent;
use jollyboard_core::store::LockStore;
use jollyboard_core::types::now_millis;
use jollyboard_events::BoardChannels;
use jollyboard_sync::canvas::HoverCursor;
use jollyboard_sync::{
    BridgeDriver, CanvasEvent, CanvasObject, LockClient, MemoryLockStore, Scene, SelectionBridge,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BOARD: &str = "board-1";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Peer {
    events: mpsc::Sender<CanvasEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<SelectionBridge<Scene>>,
}

impl Peer {
    async fn send(&self, event: CanvasEvent) {
        self.events.send(event).await.unwrap();
    }

    async fn stop(self) -> SelectionBridge<Scene> {
        self.cancel.cancel();
        self.handle.await.unwrap()
    }
}

fn scene() -> Scene {
    Scene::new(vec![
        CanvasObject::shape("rect").with_id("x"),
        CanvasObject::shape("rect").with_id("y"),
        CanvasObject::shape("ellipse").with_id("z"),
    ])
}

fn obj(id: &str) -> CanvasObject {
    CanvasObject::shape("rect").with_id(id)
}

fn spawn_peer(store: &Arc<MemoryLockStore>, hub: &BoardChannels, user_id: &str) -> Peer {
    spawn_peer_refreshing(store, hub, user_id, Duration::from_secs(60))
}

fn spawn_peer_refreshing(
    store: &Arc<MemoryLockStore>,
    hub: &BoardChannels,
    user_id: &str,
    every: Duration,
) -> Peer {
    let client = LockClient::new(store.clone(), hub.channel(BOARD));
    let bridge = SelectionBridge::new(BOARD, Participant::new(user_id, user_id), scene());
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let driver = BridgeDriver::new(bridge, client).with_refresh_interval(every);
    let handle = tokio::spawn(driver.run(rx, cancel.clone()));
    Peer {
        events: tx,
        cancel,
        handle,
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn owner_of(store: &MemoryLockStore, object_id: &str) -> Option<String> {
    store
        .select_by_board_and_ids(BOARD, &[object_id.to_string()])
        .await
        .unwrap()
        .pop()
        .map(|e| e.user_id)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

// ---------------------------------------------------------------------------
// Driver scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selection_locks_object_and_peer_sees_it() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");
    let bonny = spawn_peer(&store, &hub, "U2");
    settle().await;

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])).await;
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "x").await.as_deref() == Some("U1") }
    })
    .await;
    settle().await;

    let bonny = bonny.stop().await;
    let entry = bonny.view().get("x").expect("peer should see the lock");
    assert_eq!(entry.user_id, "U1");
    let x = bonny.canvas().find("x").unwrap();
    assert!(!x.interactivity.selectable);
    assert_eq!(x.interactivity.hover_cursor, HoverCursor::NotAllowed);

    let anne = anne.stop().await;
    assert!(anne.view().is_empty());
}

#[tokio::test]
async fn selecting_a_locked_object_is_rejected_without_writes() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");
    let bonny = spawn_peer(&store, &hub, "U2");
    settle().await;

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])).await;
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "x").await.is_some() }
    })
    .await;
    settle().await;

    bonny
        .send(CanvasEvent::SelectionCreated(vec![obj("x"), obj("y")]))
        .await;
    settle().await;

    assert_eq!(store.len().await, 1, "no partial selection may be locked");
    let bonny = bonny.stop().await;
    assert_eq!(bonny.state("y"), ObjectLockState::Unlocked);
    anne.stop().await;
}

#[tokio::test]
async fn deselect_releases_lock() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x"), obj("y")]))
        .await;
    eventually(|| {
        let store = store.clone();
        async move { store.len().await == 2 }
    })
    .await;

    anne.send(CanvasEvent::SelectionCleared(vec![obj("x"), obj("y")]))
        .await;
    eventually(|| {
        let store = store.clone();
        async move { store.is_empty().await }
    })
    .await;

    anne.stop().await;
}

#[tokio::test]
async fn object_removal_releases_lock() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");

    anne.send(CanvasEvent::SelectionCreated(vec![obj("z")])).await;
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "z").await.is_some() }
    })
    .await;

    anne.send(CanvasEvent::ObjectRemoved(obj("z"))).await;
    eventually(|| {
        let store = store.clone();
        async move { store.is_empty().await }
    })
    .await;

    anne.stop().await;
}

#[tokio::test]
async fn selection_update_moves_lock() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])).await;
    anne.send(CanvasEvent::SelectionUpdated {
        selected: vec![obj("y")],
        deselected: vec![obj("x")],
    })
    .await;

    eventually(|| {
        let store = store.clone();
        async move {
            owner_of(&store, "y").await.is_some() && owner_of(&store, "x").await.is_none()
        }
    })
    .await;

    anne.stop().await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn cancel_releases_pending_and_owned_locks() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x"), obj("y")]))
        .await;
    eventually(|| {
        let store = store.clone();
        async move { store.len().await == 2 }
    })
    .await;
    anne.send(CanvasEvent::SelectionCreated(vec![obj("z")])).await;

    let bridge = anne.stop().await;

    assert!(store.is_empty().await, "teardown must release every lock");
    assert!(bridge.owned_ids().is_empty());
}

#[tokio::test]
async fn store_change_triggers_snapshot_for_silent_writers() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");
    settle().await;

    // A writer that never broadcasts: only the change feed reports it.
    store
        .insert(BOARD, &LockEntry::new("y", "U9", "Silent", 1))
        .await
        .unwrap();
    settle().await;

    let anne = anne.stop().await;
    assert_eq!(anne.view().get("y").map(|e| e.user_id.as_str()), Some("U9"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_selection_has_one_owner() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");
    let bonny = spawn_peer(&store, &hub, "U2");
    settle().await;

    tokio::join!(
        anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])),
        bonny.send(CanvasEvent::SelectionCreated(vec![obj("x")])),
    );
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "x").await.is_some() }
    })
    .await;
    settle().await;

    let winner = owner_of(&store, "x").await.unwrap();
    assert_eq!(store.len().await, 1);

    let anne = anne.stop().await;
    let bonny = bonny.stop().await;
    let loser = if winner == "U1" { &bonny } else { &anne };

    // The loser rolled back and reconciled to the winner's lock.
    assert_eq!(loser.view().get("x").map(|e| e.user_id.as_str()), Some(winner.as_str()));
    assert!(!loser.canvas().find("x").unwrap().interactivity.selectable);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn held_locks_are_refreshed_past_the_idle_cutoff() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer_refreshing(&store, &hub, "U1", Duration::from_millis(40));

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])).await;
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "x").await.is_some() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let reclaimed = store.delete_stale(now_millis() - 200).await.unwrap();

    assert!(reclaimed.is_empty(), "a selected object must not look idle");
    assert_eq!(owner_of(&store, "x").await.as_deref(), Some("U1"));
    anne.stop().await;
}

#[tokio::test]
async fn reclaimed_lock_is_rolled_back_and_peer_can_take_it() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");
    let board = hub.channel(BOARD);
    settle().await;

    anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])).await;
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "x").await.is_some() }
    })
    .await;
    settle().await;

    // What the server's reclamation sweep does for an idle row.
    let reclaimed = store.delete_stale(now_millis() + 1).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    board.publish(BroadcastEvent::released(&["x".to_string()], "U1").unwrap());
    settle().await;

    let bonny = LockClient::new(store.clone(), hub.channel(BOARD));
    assert!(bonny.acquire_lock(BOARD, "x", "U2", "Bonny").await);
    settle().await;

    let anne = anne.stop().await;
    assert_eq!(anne.state("x"), ObjectLockState::Unlocked);
    assert!(anne.owned_ids().is_empty());
    assert!(anne.canvas().active_selection().is_empty());
    assert_eq!(anne.view().get("x").map(|e| e.user_id.as_str()), Some("U2"));
    assert!(!anne.canvas().find("x").unwrap().interactivity.selectable);
    assert_eq!(owner_of(&store, "x").await.as_deref(), Some("U2"));
}

#[tokio::test]
async fn rejected_shift_add_releases_earlier_lock() {
    let store = Arc::new(MemoryLockStore::new());
    let hub = BoardChannels::default();
    let anne = spawn_peer(&store, &hub, "U1");
    let bonny = spawn_peer(&store, &hub, "U2");
    settle().await;

    bonny.send(CanvasEvent::SelectionCreated(vec![obj("y")])).await;
    anne.send(CanvasEvent::SelectionCreated(vec![obj("x")])).await;
    eventually(|| {
        let store = store.clone();
        async move { store.len().await == 2 }
    })
    .await;
    settle().await;

    anne.send(CanvasEvent::SelectionUpdated {
        selected: vec![obj("y")],
        deselected: vec![],
    })
    .await;
    eventually(|| {
        let store = store.clone();
        async move { owner_of(&store, "x").await.is_none() }
    })
    .await;

    assert_eq!(owner_of(&store, "y").await.as_deref(), Some("U2"));
    let anne = anne.stop().await;
    assert!(anne.owned_ids().is_empty());
    bonny.stop().await;
}

// ---------------------------------------------------------------------------
// Bridge convergence
// ---------------------------------------------------------------------------

#[test]
fn broadcast_and_snapshot_converge_in_either_order() {
    let me = Participant::new("U1", "Anne");
    let row = LockEntry::new("x", "U2", "Bonny", 42);
    let event = BroadcastEvent::acquired(&["x".to_string()], "U2", "Bonny", 42).unwrap();

    let mut first = SelectionBridge::new(BOARD, me.clone(), scene());
    first.broadcast_received(&event);
    first.snapshot_received(vec![row.clone()]);

    let mut second = SelectionBridge::new(BOARD, me, scene());
    second.snapshot_received(vec![row]);
    second.broadcast_received(&event);

    assert_eq!(first.view(), second.view());
    assert_eq!(
        first.canvas().find("x").unwrap().interactivity,
        second.canvas().find("x").unwrap().interactivity
    );
}

#[test]
fn release_only_removes_matching_owner() {
    let mut bridge = SelectionBridge::new(BOARD, Participant::new("U1", "Anne"), scene());
    bridge.snapshot_received(vec![LockEntry::new("x", "U3", "Mary", 7)]);

    // U2 releasing "x" must not drop U3's newer lock.
    let stale_release = BroadcastEvent::released(&["x".to_string()], "U2").unwrap();
    assert!(!bridge.broadcast_received(&stale_release));
    assert_eq!(bridge.view().get("x").unwrap().user_id, "U3");

    let release = BroadcastEvent::released(&["x".to_string()], "U3").unwrap();
    assert!(bridge.broadcast_received(&release));
    assert!(bridge.view().is_empty());
    assert!(bridge.canvas().find("x").unwrap().interactivity.selectable);
}
