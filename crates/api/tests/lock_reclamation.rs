//! Tests for the idle lock reclamation sweep.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use jollyboard_api::background::lock_reclamation::{run, sweep_once};
use jollyboard_core::lock_state::ObjectLockState;
use jollyboard_core::locks::{LockEntry, Participant};
use jollyboard_core::protocol::BroadcastEvent;
use jollyboard_core::store::{BroadcastChannel, LockStore};
use jollyboard_core::types::now_millis;
use jollyboard_events::BoardChannels;
use jollyboard_sync::{
    BridgeDriver, CanvasEvent, CanvasObject, LockClient, MemoryLockStore, Scene, SelectionBridge,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A running bridge driver holding `x` on board `b1`.
///
/// Dropping `events` ends the driver, so it is kept alongside the handle.
struct Holder {
    _events: mpsc::Sender<CanvasEvent>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<SelectionBridge<Scene>>,
}

impl Holder {
    async fn stop(self) -> SelectionBridge<Scene> {
        self.cancel.cancel();
        self.handle.await.unwrap()
    }
}

async fn hold_x(
    store: &Arc<MemoryLockStore>,
    channels: &BoardChannels,
    user_id: &str,
    refresh_every: Duration,
) -> Holder {
    let client = LockClient::new(store.clone(), channels.channel("b1"));
    let scene = Scene::new(vec![CanvasObject::shape("rect").with_id("x")]);
    let bridge = SelectionBridge::new("b1", Participant::new(user_id, user_id), scene);
    let (tx, rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let driver = BridgeDriver::new(bridge, client).with_refresh_interval(refresh_every);
    let handle = tokio::spawn(driver.run(rx, cancel.clone()));

    tx.send(CanvasEvent::SelectionCreated(vec![
        CanvasObject::shape("rect").with_id("x"),
    ]))
    .await
    .unwrap();
    for _ in 0..100 {
        if !store.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!store.is_empty().await, "driver should lock x");
    // Let the driver record the grant.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Holder {
        _events: tx,
        cancel,
        handle,
    }
}

#[tokio::test]
async fn sweep_removes_only_rows_older_than_cutoff() {
    let store = MemoryLockStore::new();
    let channels = BoardChannels::default();
    store
        .insert("b1", &LockEntry::new("old", "U1", "Anne", 100))
        .await
        .unwrap();
    store
        .insert("b1", &LockEntry::new("fresh", "U1", "Anne", 500))
        .await
        .unwrap();

    let reclaimed = sweep_once(&store, &channels, 200).await.unwrap();

    assert_eq!(reclaimed, 1);
    let left = store.select_by_board("b1").await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].object_id, "fresh");
}

#[tokio::test]
async fn sweep_announces_one_release_per_board_and_owner() {
    let store = MemoryLockStore::new();
    let channels = BoardChannels::default();
    let mut rx = channels.channel("b1").subscribe();

    for (id, user) in [("a", "U1"), ("b", "U1"), ("c", "U2")] {
        store
            .insert("b1", &LockEntry::new(id, user, user, 1))
            .await
            .unwrap();
    }
    store
        .insert("b2", &LockEntry::new("z", "U1", "Anne", 1))
        .await
        .unwrap();

    let reclaimed = sweep_once(&store, &channels, 10).await.unwrap();
    assert_eq!(reclaimed, 4);

    let mut events = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    events.sort_by(|a, b| a.user_id().cmp(b.user_id()));

    assert_matches!(events[0], BroadcastEvent::LockReleased { .. });
    assert_eq!(events[0].user_id(), "U1");
    let mut ids = events[0].object_ids();
    ids.sort();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(events[1].user_id(), "U2");
    assert_eq!(events[1].object_ids(), vec!["c".to_string()]);

    // Nothing from board b2 leaks onto b1.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn sweep_with_nothing_stale_publishes_nothing() {
    let store = MemoryLockStore::new();
    let channels = BoardChannels::default();
    let mut rx = channels.channel("b1").subscribe();
    store
        .insert("b1", &LockEntry::new("x", "U1", "Anne", 1_000))
        .await
        .unwrap();

    assert_eq!(sweep_once(&store, &channels, 10).await.unwrap(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn run_reclaims_until_cancelled() {
    let store = Arc::new(MemoryLockStore::new());
    let channels = Arc::new(BoardChannels::default());
    store
        .insert("b1", &LockEntry::new("x", "U1", "Anne", 1))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run(
        store.clone(),
        channels,
        Duration::from_secs(30),
        Duration::from_millis(20),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.is_empty().await);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("job should stop on cancel")
        .unwrap();
}

#[tokio::test]
async fn sweep_spares_locks_of_a_connected_client() {
    let store = Arc::new(MemoryLockStore::new());
    let channels = BoardChannels::default();
    let holder = hold_x(&store, &channels, "U1", Duration::from_millis(40)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let reclaimed = sweep_once(store.as_ref(), &channels, now_millis() - 200)
        .await
        .unwrap();

    assert_eq!(reclaimed, 0);
    let bridge = holder.stop().await;
    assert!(bridge.owned_ids().is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn swept_lock_is_dropped_by_its_former_owner() {
    let store = Arc::new(MemoryLockStore::new());
    let channels = BoardChannels::default();
    let holder = hold_x(&store, &channels, "U1", Duration::from_secs(60)).await;

    let reclaimed = sweep_once(store.as_ref(), &channels, now_millis() + 1)
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let other = LockClient::new(store.clone(), channels.channel("b1"));
    assert!(other.acquire_lock("b1", "x", "U2", "Bonny").await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let bridge = holder.stop().await;
    assert_eq!(bridge.state("x"), ObjectLockState::Unlocked);
    assert_eq!(
        bridge.view().get("x").map(|e| e.user_id.as_str()),
        Some("U2")
    );
    // Teardown must not touch the new owner's row.
    let rows = store.select_by_board("b1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "U2");
}
