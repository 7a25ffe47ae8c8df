/// === CONNECTION REGISTRY ===
///
/// Owns the set of live connections, the connection→username map, and the
/// username→preferred-language map. All three are guarded by one RwLock and
/// are only ever touched together, so admit/remove can never be observed
/// half-applied by an in-flight broadcast snapshot.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};

use crate::server::protocol::OutboundFrame;

/// Process-wide connection identity counter.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh connection id, unique for the process lifetime.
pub fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::SeqCst)
}

/// Represents one connected client. Cloning this struct is cheap (id + channel).
///
/// The outbound sender enqueues frames for the session task that owns the
/// socket; sending to a connection that is already gone fails and the caller
/// decides whether that matters.
#[derive(Clone, Debug)]
pub struct ClientConn {
    /// Identity of this physical connection, unique for the process lifetime.
    pub id: u64,

    /// The client's socket address (used for logging).
    pub addr: SocketAddr,

    /// Queue of frames to write to this connection, drained in order by its
    /// session task.
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
}

/// One row of a broadcast snapshot: a connection, its owner, and the language
/// the owner wants to receive text in.
#[derive(Clone, Debug)]
pub struct ReceiverEntry {
    pub conn: ClientConn,
    pub username: String,
    pub lang: String,
}

#[derive(Default)]
struct RegistryInner {
    /// Active connections, in admission order.
    active: Vec<ClientConn>,
    /// Connection id -> username.
    users: HashMap<u64, String>,
    /// Username -> preferred language code. Survives reconnects; entries are
    /// never removed while the process runs.
    user_lang: HashMap<String, String>,
}

/// The shared registry. Created once at startup and handed around as
/// `Arc<ConnectionRegistry>`.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new connection for `username`, ensuring one clean active
    /// connection per user.
    ///
    /// Any connection already mapped to the same username is told to close
    /// (best effort; a failed enqueue is swallowed) and dropped from the
    /// registry regardless. First-time usernames get the "en" default
    /// language.
    pub async fn admit(&self, conn: ClientConn, username: &str) {
        let mut inner = self.inner.write().await;

        // Close any old connection by the same user
        let stale: Vec<u64> = inner
            .active
            .iter()
            .filter(|c| inner.users.get(&c.id).map(String::as_str) == Some(username))
            .map(|c| c.id)
            .collect();
        for id in stale {
            if let Some(pos) = inner.active.iter().position(|c| c.id == id) {
                let old = inner.active.remove(pos);
                let _ = old.outbound.send(OutboundFrame::Close);
            }
            inner.users.remove(&id);
        }

        inner.users.insert(conn.id, username.to_string());
        inner.active.push(conn);

        // Default language
        inner
            .user_lang
            .entry(username.to_string())
            .or_insert_with(|| "en".to_string());
    }

    /// Drop a connection and its username mapping. Silent no-op when the
    /// connection is not present (e.g. it was already evicted). The language
    /// map is untouched so the preference survives reconnects.
    pub async fn remove(&self, id: u64) {
        let mut inner = self.inner.write().await;
        inner.active.retain(|c| c.id != id);
        inner.users.remove(&id);
    }

    /// Record `username`'s preferred language. Unconditional overwrite; the
    /// code is not validated here — an unsupported code surfaces later as a
    /// provider failure and falls back to the original text.
    pub async fn set_language(&self, username: &str, lang: &str) {
        let mut inner = self.inner.write().await;
        inner
            .user_lang
            .insert(username.to_string(), lang.to_string());
    }

    /// Point-in-time copy of every active connection with its resolved
    /// language. The lock is released before any translation work starts, so
    /// admissions and removals during a fan-out cannot corrupt delivery.
    pub async fn snapshot_receivers(&self) -> Vec<ReceiverEntry> {
        let inner = self.inner.read().await;
        inner
            .active
            .iter()
            .filter_map(|conn| {
                let username = inner.users.get(&conn.id)?.clone();
                let lang = inner
                    .user_lang
                    .get(&username)
                    .cloned()
                    .unwrap_or_else(|| "en".to_string());
                Some(ReceiverEntry {
                    conn: conn.clone(),
                    username,
                    lang,
                })
            })
            .collect()
    }

    /// Number of currently active connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.active.len()
    }
}
