//! End-to-end tests over real sockets: handshake, ack round-trips, translated
//! deliveries, same-username eviction, and malformed-frame teardown.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use lingua_relay::config::ServerConfig;
use lingua_relay::logger::Logger;
use lingua_relay::server::accept_connections;
use lingua_relay::server::fanout::BroadcastEngine;
use lingua_relay::server::registry::ConnectionRegistry;
use lingua_relay::translate::{TranslateError, Translator};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TaggingTranslator;

impl Translator for TaggingTranslator {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        Ok(format!("[{}] {}", target_lang, text))
    }
}

/// Spin up a relay on an ephemeral port and return its address.
async fn spawn_relay() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Arc::new(ConnectionRegistry::new());
    let engine = BroadcastEngine::new(Arc::clone(&registry), Arc::new(TaggingTranslator), Logger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    tokio::spawn(accept_connections(
        listener,
        registry,
        engine,
        shutdown_tx,
        shutdown_rx,
        ServerConfig::default(),
        Logger,
    ));

    addr
}

async fn connect(addr: SocketAddr, username: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/{}", addr, username))
        .await
        .unwrap();
    ws
}

/// Read frames until the next JSON text frame.
async fn next_json(ws: &mut ClientWs) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(raw))) => return serde_json::from_str(&raw).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("connection ended while waiting for a frame: {other:?}"),
        }
    }
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Set a language and wait for the ack, which also guarantees the server has
/// finished admitting this connection.
async fn set_lang(ws: &mut ClientWs, lang: &str) {
    send_json(ws, json!({"type": "set_lang", "lang": lang})).await;
    let ack = next_json(ws).await;
    assert_eq!(ack, json!({"type": "lang_ack", "lang": lang}));
}

/// The connection should be over: anything but further data frames.
async fn assert_closed(ws: &mut ClientWs) {
    loop {
        match ws.next().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(Message::Text(raw))) => panic!("expected close, got frame: {raw}"),
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn set_lang_is_acknowledged_point_to_point() {
    let addr = spawn_relay().await;

    let mut bob = connect(addr, "bob").await;
    set_lang(&mut bob, "hi").await;

    // A missing lang falls back to "en"
    send_json(&mut bob, json!({"type": "set_lang"})).await;
    let ack = next_json(&mut bob).await;
    assert_eq!(ack, json!({"type": "lang_ack", "lang": "en"}));
}

#[tokio::test]
async fn messages_are_translated_per_receiver() {
    let addr = spawn_relay().await;

    let mut alice = connect(addr, "alice").await;
    set_lang(&mut alice, "en").await;
    let mut bob = connect(addr, "bob").await;
    set_lang(&mut bob, "hi").await;

    send_json(&mut alice, json!({"type": "message", "text": "Hello"})).await;

    let to_alice = next_json(&mut alice).await;
    assert_eq!(to_alice["sender"], "alice");
    assert_eq!(to_alice["original"], "Hello");
    assert_eq!(to_alice["target_lang"], "en");
    assert_eq!(to_alice["translated"], "[en] Hello");
    assert!(to_alice["latency"].as_f64().unwrap() >= 0.0);
    assert!(to_alice["timestamp"].as_f64().unwrap() > 0.0);

    let to_bob = next_json(&mut bob).await;
    assert_eq!(to_bob["sender"], "alice");
    assert_eq!(to_bob["original"], "Hello");
    assert_eq!(to_bob["target_lang"], "hi");
    assert_eq!(to_bob["translated"], "[hi] Hello");
}

#[tokio::test]
async fn translate_false_reaches_everyone_verbatim() {
    let addr = spawn_relay().await;

    let mut alice = connect(addr, "alice").await;
    set_lang(&mut alice, "en").await;
    let mut bob = connect(addr, "bob").await;
    set_lang(&mut bob, "hi").await;

    send_json(
        &mut alice,
        json!({"type": "message", "text": "hi", "translate": false}),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let record = next_json(ws).await;
        assert_eq!(record["translated"], "hi");
        assert_eq!(record["original"], "hi");
    }
}

#[tokio::test]
async fn a_new_connection_evicts_the_old_one_for_the_same_username() {
    let addr = spawn_relay().await;

    let mut old = connect(addr, "alice").await;
    set_lang(&mut old, "en").await;

    let mut new = connect(addr, "alice").await;
    set_lang(&mut new, "fr").await; // ack implies the new session is admitted

    assert_closed(&mut old).await;

    // Only the new connection receives broadcasts now
    send_json(&mut new, json!({"type": "message", "text": "still here"})).await;
    let record = next_json(&mut new).await;
    assert_eq!(record["sender"], "alice");
    assert_eq!(record["translated"], "[fr] still here");
}

#[tokio::test]
async fn successive_messages_from_one_sender_stay_ordered() {
    let addr = spawn_relay().await;

    let mut carol = connect(addr, "carol").await;
    set_lang(&mut carol, "en").await;
    let mut dave = connect(addr, "dave").await;
    set_lang(&mut dave, "fr").await;

    for text in ["one", "two", "three"] {
        send_json(&mut carol, json!({"type": "message", "text": text})).await;
    }

    for expected in ["one", "two", "three"] {
        let record = next_json(&mut dave).await;
        assert_eq!(record["original"], expected);
    }
}

#[tokio::test]
async fn unknown_event_types_are_ignored() {
    let addr = spawn_relay().await;

    let mut eve = connect(addr, "eve").await;
    set_lang(&mut eve, "en").await;

    send_json(&mut eve, json!({"type": "typing", "state": "on"})).await;

    // The connection is still healthy afterwards
    send_json(&mut eve, json!({"type": "message", "text": "ping"})).await;
    let record = next_json(&mut eve).await;
    assert_eq!(record["original"], "ping");
}

#[tokio::test]
async fn a_malformed_frame_tears_down_only_that_connection() {
    let addr = spawn_relay().await;

    let mut healthy = connect(addr, "healthy").await;
    set_lang(&mut healthy, "en").await;

    let mut broken = connect(addr, "broken").await;
    set_lang(&mut broken, "en").await;

    broken
        .send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();
    assert_closed(&mut broken).await;

    // The other connection keeps working
    send_json(&mut healthy, json!({"type": "message", "text": "alive"})).await;
    let record = next_json(&mut healthy).await;
    assert_eq!(record["original"], "alive");
}

#[tokio::test]
async fn non_ws_paths_are_rejected_during_the_handshake() {
    let addr = spawn_relay().await;

    let err = tokio_tungstenite::connect_async(format!("ws://{}/other/alice", addr)).await;
    assert!(err.is_err());
}
