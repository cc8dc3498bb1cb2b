//! Client registry
//!
//! Maintains the set of currently known clients, keyed by their stable
//! identifier. The registry is the single source of truth for "who is
//! currently connected"; membership is mutated only by the handshake path
//! (insert/rebind) and the liveness sweep (remove).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Process-wide counter for connection identities.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// A send to a peer failed because its connection is gone
#[derive(Debug, Error)]
#[error("connection {conn_id} is no longer open")]
pub struct SendFailure {
    /// Connection identity of the unreachable peer
    pub conn_id: u64,
}

/// Handle to one live client connection.
///
/// Wraps the connection's outbound message queue together with a
/// process-unique connection id. Sender exclusion during broadcast and
/// collision detection during handshake compare connection ids, never the
/// identities claimed in message payloads.
///
/// `is_open` is a local state check on the queue, not a network probe, so
/// the liveness sweep can call it without blocking on I/O.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Create a handle around a connection's outbound queue
    pub fn new(outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            outbound,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Process-unique identity of the underlying connection
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Whether the underlying connection is still open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.outbound.is_closed()
    }

    /// Whether this handle and `other` refer to the same connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.conn_id == other.conn_id
    }

    /// Mark the connection as closed. Called by the connection task when the
    /// socket dies; after this the liveness sweep will reap any record still
    /// bound to this connection.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Queue a message for delivery to this connection
    pub fn send(&self, message: Message) -> Result<(), SendFailure> {
        if !self.is_open() {
            return Err(SendFailure {
                conn_id: self.conn_id,
            });
        }
        self.outbound.send(message).map_err(|_| SendFailure {
            conn_id: self.conn_id,
        })
    }

    /// Queue a text frame for delivery to this connection
    pub fn send_text(&self, text: String) -> Result<(), SendFailure> {
        self.send(Message::Text(text))
    }

    /// Queue a close frame, asking the connection task to drop the socket
    pub fn close(&self) {
        let _ = self.send(Message::Close(None));
    }
}

/// One logical chat participant.
///
/// The record outlives any single connection: on reconnect the handle is
/// rebound in place and `id`/`name` are untouched.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    id: String,
    name: String,
    handle: ConnectionHandle,
}

impl ClientRecord {
    /// Create a record binding an identity to a live connection
    pub fn new(id: impl Into<String>, name: impl Into<String>, handle: ConnectionHandle) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            handle,
        }
    }

    /// Stable client identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The connection currently bound to this identity
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

/// Registry of currently known clients, keyed by stable identifier.
///
/// Not internally synchronized; callers wrap it in a single lock and hold
/// that lock for the full duration of each operation, including the
/// find-then-rebind sequence of the handshake path.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    records: HashMap<String, ClientRecord>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known clients
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no clients are known
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by stable identifier
    pub fn find(&self, id: &str) -> Option<&ClientRecord> {
        self.records.get(id)
    }

    /// Add a new record. The caller guarantees the id is not already present.
    pub fn insert(&mut self, record: ClientRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Replace the connection bound to an existing identity. The old handle
    /// is dropped; `id` and `name` are unchanged. Returns false if the id is
    /// unknown.
    pub fn rebind(&mut self, id: &str, handle: ConnectionHandle) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.handle = handle;
                true
            }
            None => false,
        }
    }

    /// Remove every record whose connection fails `is_open`, returning the
    /// removed records so the caller can log the disconnects.
    pub fn sweep_dead<F>(&mut self, is_open: F) -> Vec<ClientRecord>
    where
        F: Fn(&ConnectionHandle) -> bool,
    {
        let dead: Vec<String> = self
            .records
            .values()
            .filter(|record| !is_open(&record.handle))
            .map(|record| record.id.clone())
            .collect();

        dead.into_iter()
            .filter_map(|id| self.records.remove(&id))
            .collect()
    }

    /// Iterate all current records. Used for broadcast; no ordering
    /// guarantee.
    pub fn records(&self) -> impl Iterator<Item = &ClientRecord> {
        self.records.values()
    }
}
