//! Client registry.
//!
//! The one resource shared across sessions: a concurrent map from claimed
//! identifier to the owning session's routing handle. `try_claim` is the
//! single serialization point for the identifier-uniqueness invariant — the
//! check and the insert happen under one write lock, so two sessions racing
//! for the same id can never both win.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parley_proto::{Identifier, Reply};
use tokio::sync::{RwLock, mpsc};

/// The routing half of a session: enough to deliver a line to it.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    /// Connection id of the owning session (log correlation, panic backstop).
    conn_id: u64,
    /// Sender side of the session's outbox; its write loop drains this.
    outbox: mpsc::UnboundedSender<Reply>,
}

/// Delivery failed because the peer's session is tearing down.
#[derive(Debug, thiserror::Error)]
#[error("peer outbox closed")]
pub struct OutboxClosed;

impl PeerHandle {
    /// Create a handle from a connection id and outbox sender.
    pub fn new(conn_id: u64, outbox: mpsc::UnboundedSender<Reply>) -> Self {
        Self { conn_id, outbox }
    }

    /// Connection id of the owning session.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Enqueue a reply for delivery to this peer.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxClosed`] if the peer's session has already dropped
    /// its receive side (teardown in progress).
    pub fn deliver(&self, reply: Reply) -> Result<(), OutboxClosed> {
        self.outbox.send(reply).map_err(|_| OutboxClosed)
    }
}

/// Process-wide map of active identifier claims.
///
/// Cheap to clone; all clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RwLock<HashMap<Identifier, PeerHandle>>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `id` for the session behind `handle`.
    ///
    /// Returns `false` without mutating anything if the identifier is
    /// already taken.
    pub async fn try_claim(&self, id: Identifier, handle: PeerHandle) -> bool {
        let mut map = self.inner.write().await;
        match map.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Release a claimed identifier. No-op (and `false`) if absent.
    pub async fn release(&self, id: &Identifier) -> bool {
        self.inner.write().await.remove(id).is_some()
    }

    /// Release whatever identifier the given connection holds, if any.
    ///
    /// Backstop for the supervisor: if a session task dies without running
    /// its own teardown, its claim must still go away.
    pub async fn release_conn(&self, conn_id: u64) -> Option<Identifier> {
        let mut map = self.inner.write().await;
        let id = map.iter().find(|(_, h)| h.conn_id == conn_id).map(|(id, _)| id.clone())?;
        map.remove(&id);
        Some(id)
    }

    /// A consistent point-in-time listing of claimed identifiers, sorted.
    ///
    /// The read lock is held only for the copy.
    pub async fn snapshot(&self) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Look up the routing handle for an identifier.
    pub async fn lookup(&self, id: &Identifier) -> Option<PeerHandle> {
        self.inner.read().await.get(id).cloned()
    }

    /// Number of active claims.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether no identifier is currently claimed.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
