//! Unit tests for `WsManager`.
//!
//! These tests exercise the realtime connection registry directly, without
//! performing any HTTP upgrades.

use axum::extract::ws::Message;
use jollyboard_api::ws::WsManager;

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn add_and_remove_track_count() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".into(), "b1".into(), "U1".into()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn remove_unknown_id_is_noop() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".into(), "b1".into(), "U1".into()).await;
    manager.remove("nonexistent").await;

    assert_eq!(manager.connection_count().await, 1);
}

#[tokio::test]
async fn connections_are_counted_per_board() {
    let manager = WsManager::new();

    let _a = manager.add("conn-1".into(), "b1".into(), "U1".into()).await;
    let _b = manager.add("conn-2".into(), "b1".into(), "U2".into()).await;
    let _c = manager.add("conn-3".into(), "b2".into(), "U1".into()).await;

    assert_eq!(manager.connections_on_board("b1").await, 2);
    assert_eq!(manager.connections_on_board("b2").await, 1);
    assert_eq!(manager.connections_on_board("b3").await, 0);

    manager.remove("conn-1").await;
    assert_eq!(manager.connections_on_board("b1").await, 1);
}

#[tokio::test]
async fn ping_all_reaches_every_connection() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".into(), "b1".into(), "U1".into()).await;
    let rx2 = manager.add("conn-2".into(), "b2".into(), "U2".into()).await;
    drop(rx2);

    // A closed receiver must not stop the others.
    manager.ping_all().await;

    let msg = rx1.recv().await.expect("rx1 should receive a ping");
    assert!(matches!(msg, Message::Ping(_)), "Expected Ping, got: {msg:?}");
}

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".into(), "b1".into(), "U1".into()).await;
    let mut rx2 = manager.add("conn-2".into(), "b1".into(), "U2".into()).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);

    let msg1 = rx1.recv().await.expect("rx1 should receive Close");
    assert!(matches!(msg1, Message::Close(None)));
    let msg2 = rx2.recv().await.expect("rx2 should receive Close");
    assert!(matches!(msg2, Message::Close(None)));

    assert!(
        rx1.recv().await.is_none(),
        "Channel should be closed after shutdown"
    );
}
