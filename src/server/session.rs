/// === CLIENT SESSIONS ===
///
/// One task per physical connection: WebSocket handshake, admission into the
/// registry (evicting a stale same-user connection first), then a select loop
/// reading inbound events and draining this connection's outbound queue until
/// the peer leaves, a fatal decode error occurs, the connection is evicted,
/// or the server shuts down. Teardown always removes the connection from the
/// registry; no error escapes this module except as a logged warning.
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::logger::Logger;
use crate::server::fanout::BroadcastEngine;
use crate::server::protocol::{Decoded, InboundEvent, LangAck, OutboundFrame, decode_event};
use crate::server::registry::{ClientConn, ConnectionRegistry, next_conn_id};

/// Extract the username from a `/ws/{username}` request path.
/// Returns `None` for any other path.
fn parse_username(path: &str) -> Option<String> {
    let path = path.split('?').next().unwrap_or(path);
    let segment = path.strip_prefix("/ws/")?;
    if segment.is_empty() || segment.contains('/') {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?;
    let username = decoded.into_owned();
    if username.is_empty() { None } else { Some(username) }
}

/// Run the full lifetime of one client connection.
pub async fn handle_session(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    engine: BroadcastEngine,
    shutdown_rx: &mut broadcast::Receiver<()>,
    logger: Logger,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Capture the username during the handshake; requests for any other path
    // are rejected before the WebSocket is established.
    let captured = Arc::new(std::sync::Mutex::new(None::<String>));
    let capture = Arc::clone(&captured);
    let ws = tokio_tungstenite::accept_hdr_async(
        stream,
        move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match parse_username(req.uri().path()) {
                Some(username) => {
                    if let Ok(mut guard) = capture.lock() {
                        *guard = Some(username);
                    }
                    Ok(response)
                }
                None => {
                    let mut resp = ErrorResponse::new(Some("expected /ws/{username}".to_string()));
                    *resp.status_mut() = StatusCode::NOT_FOUND;
                    Err(resp)
                }
            }
        },
    )
    .await?;

    let username = captured
        .lock()
        .ok()
        .and_then(|mut guard| guard.take())
        .ok_or("handshake accepted without a username")?;

    let (mut ws_sink, mut ws_stream) = ws.split();

    // This connection's outbound queue. The registry and in-flight fan-outs
    // hold senders; only this task writes to the socket.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let conn = ClientConn {
        id: next_conn_id(),
        addr,
        outbound: out_tx,
    };
    let conn_id = conn.id;

    registry.admit(conn, &username).await;
    logger.info(&format!("🔌 {} joined as '{}'", addr, username));

    // Broadcast worker for this sender: one fan-out at a time, so successive
    // messages from the same user reach each receiver in order while the
    // read loop below never waits on deliveries.
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<(String, bool)>();
    {
        let engine = engine.clone();
        let username = username.clone();
        tokio::spawn(async move {
            while let Some((text, translate)) = msg_rx.recv().await {
                engine.broadcast(&username, &text, translate).await;
            }
        });
    }

    loop {
        tokio::select! {
            // Inbound frame from the peer
            maybe_msg = ws_stream.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(raw))) => {
                        match decode_event(&raw) {
                            Ok(Decoded::Event(InboundEvent::SetLang { lang })) => {
                                registry.set_language(&username, &lang).await;
                                logger.info(&format!("🌐 '{}' set language to '{}'", username, lang));
                                // Point-to-point acknowledgement, never broadcast
                                if let Some(ack) = OutboundFrame::LangAck(LangAck::new(&lang)).to_json() {
                                    if let Err(e) = ws_sink.send(Message::Text(ack)).await {
                                        logger.warn(&format!("❌ Failed to send lang_ack to {}: {}", addr, e));
                                        break;
                                    }
                                }
                            }
                            Ok(Decoded::Event(InboundEvent::Message { text, translate })) => {
                                logger.info(&format!("📨 From '{}': {}", username, text));
                                if msg_tx.send((text, translate)).is_err() {
                                    logger.warn(&format!("⚠️ Broadcast worker for '{}' is gone", username));
                                }
                            }
                            Ok(Decoded::Ignored) => {}
                            Err(e) => {
                                // Malformed frame: fatal for this connection only
                                logger.warn(&format!("❌ Malformed frame from {}: {}", addr, e));
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        logger.info(&format!("⚠️ {} disconnected gracefully.", addr));
                        break;
                    }
                    Some(Ok(_)) => {} // binary / ping / pong: skipped
                    Some(Err(e)) => {
                        logger.warn(&format!("❌ Error reading from {}: {}", addr, e));
                        break;
                    }
                }
            }

            // Next frame queued for this connection
            maybe_frame = out_rx.recv() => {
                match maybe_frame {
                    Some(OutboundFrame::Close) => {
                        // Evicted: the username was reclaimed by a newer connection
                        logger.info(&format!(
                            "🛑 {} evicted: '{}' reclaimed by a new connection", addr, username
                        ));
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(frame) => {
                        if let Some(json) = frame.to_json() {
                            if let Err(e) = ws_sink.send(Message::Text(json)).await {
                                logger.warn(&format!("❌ Failed to send to {}: {}", addr, e));
                                break;
                            }
                        }
                    }
                    None => break, // registry dropped us without a Close
                }
            }

            // Global shutdown signal from the server
            _ = shutdown_rx.recv() => {
                logger.warn(&format!("🛑 {} disconnected due to shutdown.", addr));
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Remove this connection and report how many remain. A no-op when the
    // entry was already evicted by a newer same-user connection.
    registry.remove(conn_id).await;
    let remaining = registry.connection_count().await;
    logger.info(&format!(
        "🧼 Client {} ('{}') removed; {} clients remain",
        addr, username, remaining
    ));

    Ok(())
}
