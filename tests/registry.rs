//! Registry invariants: one live connection per username, "en" defaulting,
//! and language persistence across reconnects.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use lingua_relay::server::protocol::OutboundFrame;
use lingua_relay::server::registry::{ClientConn, ConnectionRegistry, next_conn_id};

fn test_conn() -> (ClientConn, mpsc::UnboundedReceiver<OutboundFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
    (
        ClientConn {
            id: next_conn_id(),
            addr,
            outbound: tx,
        },
        rx,
    )
}

#[tokio::test]
async fn admit_keeps_one_connection_per_username() {
    let registry = ConnectionRegistry::new();

    let (first, mut first_rx) = test_conn();
    let (second, _second_rx) = test_conn();
    let second_id = second.id;

    registry.admit(first, "alice").await;
    registry.admit(second, "alice").await;

    let receivers = registry.snapshot_receivers().await;
    assert_eq!(receivers.len(), 1);
    assert_eq!(receivers[0].conn.id, second_id);
    assert_eq!(receivers[0].username, "alice");

    // The stale connection was told to close
    assert!(matches!(first_rx.try_recv(), Ok(OutboundFrame::Close)));
}

#[tokio::test]
async fn repeated_admits_leave_only_the_latest() {
    let registry = ConnectionRegistry::new();

    let mut last_id = 0;
    for _ in 0..5 {
        let (conn, _rx) = test_conn();
        last_id = conn.id;
        registry.admit(conn, "bob").await;
    }

    let receivers = registry.snapshot_receivers().await;
    assert_eq!(receivers.len(), 1);
    assert_eq!(receivers[0].conn.id, last_id);
    assert_eq!(registry.connection_count().await, 1);
}

#[tokio::test]
async fn eviction_tolerates_a_dead_outbound_channel() {
    let registry = ConnectionRegistry::new();

    let (first, first_rx) = test_conn();
    drop(first_rx); // the stale session is already gone
    registry.admit(first, "carol").await;

    let (second, _rx) = test_conn();
    let second_id = second.id;
    registry.admit(second, "carol").await;

    let receivers = registry.snapshot_receivers().await;
    assert_eq!(receivers.len(), 1);
    assert_eq!(receivers[0].conn.id, second_id);
}

#[tokio::test]
async fn unset_language_resolves_to_en() {
    let registry = ConnectionRegistry::new();
    let (conn, _rx) = test_conn();
    registry.admit(conn, "dave").await;

    let receivers = registry.snapshot_receivers().await;
    assert_eq!(receivers[0].lang, "en");
}

#[tokio::test]
async fn language_persists_across_reconnect() {
    let registry = ConnectionRegistry::new();

    let (first, _rx1) = test_conn();
    let first_id = first.id;
    registry.admit(first, "erin").await;
    registry.set_language("erin", "fr").await;

    registry.remove(first_id).await;
    assert!(registry.snapshot_receivers().await.is_empty());

    let (second, _rx2) = test_conn();
    registry.admit(second, "erin").await;

    let receivers = registry.snapshot_receivers().await;
    assert_eq!(receivers[0].lang, "fr");
}

#[tokio::test]
async fn set_language_overwrites() {
    let registry = ConnectionRegistry::new();
    let (conn, _rx) = test_conn();
    registry.admit(conn, "frank").await;

    registry.set_language("frank", "de").await;
    registry.set_language("frank", "ja").await;

    let receivers = registry.snapshot_receivers().await;
    assert_eq!(receivers[0].lang, "ja");
}

#[tokio::test]
async fn remove_is_a_noop_for_unknown_connections() {
    let registry = ConnectionRegistry::new();
    let (conn, _rx) = test_conn();
    registry.admit(conn, "grace").await;

    registry.remove(u64::MAX).await;

    assert_eq!(registry.connection_count().await, 1);
}
