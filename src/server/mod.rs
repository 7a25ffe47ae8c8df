/// === SERVER ===
///
/// Accept loop and wiring: binds the listener, builds the shared registry and
/// fan-out engine, spawns one session task per incoming connection, and
/// reacts to the global shutdown signal.

// Shared ownership across tasks.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// Tokio's non-blocking TCP listener plus signaling and timing utilities.
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time;

// Public submodules of the relay server.
pub mod fanout;
pub mod protocol;
pub mod registry;
pub mod session;

use crate::config::ServerConfig;
use crate::logger::Logger;
use crate::server::fanout::BroadcastEngine;
use crate::server::registry::ConnectionRegistry;
use crate::server::session::handle_session;
use crate::translate::{GtxTranslator, Translator};

/// Launch the relay server:
/// - Binds to the configured host and port
/// - Builds the connection registry and broadcast engine
/// - Spawns the Ctrl+C shutdown listener
/// - Accepts client connections until shutdown
pub async fn run_server(
    config: ServerConfig,
    logger: Logger,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    logger.info(&format!("🚀 Relay server listening on {}", addr));

    let registry = Arc::new(ConnectionRegistry::new());
    let translator: Arc<dyn Translator> = Arc::new(GtxTranslator::new(Duration::from_secs(
        config.translate_timeout_secs,
    )));
    let engine = BroadcastEngine::new(Arc::clone(&registry), translator, logger.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let shutdown_handle = spawn_shutdown_listener(shutdown_tx.clone(), logger.clone());

    accept_connections(
        listener,
        registry,
        engine,
        shutdown_tx,
        shutdown_rx,
        config,
        logger,
    )
    .await;

    // The accept loop is done; stop waiting for Ctrl+C.
    shutdown_handle.abort();

    Ok(())
}

/// Listens for new clients, spawns a session task for each, and reacts to the
/// global shutdown signal. Takes the pre-bound listener so tests can drive it
/// on an ephemeral port.
pub async fn accept_connections(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    engine: BroadcastEngine,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    config: ServerConfig,
    logger: Logger,
) {
    // How many clients are currently connected, for the lifecycle log lines.
    let connection_count = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        // Small frames should go out immediately
                        if let Err(e) = stream.set_nodelay(true) {
                            logger.warn(&format!("⚠️ Failed to set TCP_NODELAY for {}: {}", addr, e));
                        }

                        let current = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                        logger.info(&format!("🔌 {} connected. Active connections: {}", addr, current));

                        let registry = Arc::clone(&registry);
                        let engine = engine.clone();
                        let logger = logger.clone();
                        let mut shutdown_rx = shutdown_tx.subscribe();
                        let counter = Arc::clone(&connection_count);

                        tokio::spawn(async move {
                            if let Err(e) = handle_session(
                                stream,
                                addr,
                                registry,
                                engine,
                                &mut shutdown_rx,
                                logger.clone(),
                            )
                            .await
                            {
                                logger.warn(&format!("⚠️ Error with {}: {}", addr, e));
                            }

                            let remaining = counter.fetch_sub(1, Ordering::SeqCst) - 1;
                            logger.info(&format!(
                                "🔌 {} disconnected. Active connections: {}", addr, remaining
                            ));
                        });
                    }
                    Err(e) => {
                        logger.warn(&format!("⚠️ Failed to accept connection: {}", e));
                        // Brief pause to avoid spinning on repeated errors
                        time::sleep(Duration::from_millis(config.accept_error_backoff_ms)).await;
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                logger.info("🧹 Server received shutdown signal.");
                break;
            }
        }
    }
}

/// Spawns a background task that waits for Ctrl+C, logs it, and broadcasts
/// the shutdown signal to every session task.
fn spawn_shutdown_listener(
    shutdown_tx: broadcast::Sender<()>,
    logger: Logger,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger.error(&format!("Failed to listen for ctrl_c: {}", e));
            return;
        }
        logger.warn("🛑 Ctrl+C received — shutting down.");
        let _ = shutdown_tx.send(());
    })
}
