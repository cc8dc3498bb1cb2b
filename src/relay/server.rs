//! Relay core
//!
//! Owns the client registry and implements the identity and broadcast
//! policies: assigning or resuming identities on handshake, rejecting
//! identity collisions, fanning chat payloads out to every other open
//! connection, and reaping dead registry entries on the periodic sweep.

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::registry::{ClientRecord, ClientRegistry, ConnectionHandle};
use crate::identity;
use crate::server::WireMessage;

/// Identity bound to a connection after a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Stable client identifier
    pub id: String,
    /// Human-readable display name
    pub name: String,
}

/// Result of processing a handshake message
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The connection is now bound to `identity`. `reply` carries the
    /// confirmation handshake for newly created records (the client persists
    /// the assigned identity for later reconnects); reconnections get no
    /// reply.
    Accepted {
        identity: ClientIdentity,
        reply: Option<WireMessage>,
    },

    /// The presented id is already bound to a different live connection.
    /// The presenting connection must be closed; the registry is untouched.
    Rejected {
        /// The contested identifier
        id: String,
    },
}

/// The broadcast relay.
///
/// All registry access goes through one `RwLock` acquisition per operation.
/// The handshake path holds the write lock across its find-then-mutate
/// sequence so a connection handle is never bound to two records and a
/// collision check cannot race a concurrent rebind.
pub struct RelayServer {
    registry: RwLock<ClientRegistry>,
}

impl RelayServer {
    /// Create a relay with an empty registry
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(ClientRegistry::new()),
        }
    }

    /// Number of currently known clients
    pub async fn client_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Process a handshake from `conn` presenting `id`/`name`.
    ///
    /// Both fields empty is the sentinel for "assign me a new identity".
    /// A non-empty id is looked up: if it is bound to a different live
    /// connection the handshake is rejected, if it is bound to this
    /// connection or to a dead one the record is rebound (the reconnection
    /// path), and an unknown id is accepted as-is and inserted.
    pub async fn handshake(
        &self,
        conn: &ConnectionHandle,
        id: String,
        name: String,
    ) -> HandshakeOutcome {
        if id.is_empty() && name.is_empty() {
            let identity = ClientIdentity {
                id: identity::unique_client_id(),
                name: identity::display_name(),
            };
            let mut registry = self.registry.write().await;
            registry.insert(ClientRecord::new(
                identity.id.clone(),
                identity.name.clone(),
                conn.clone(),
            ));
            info!("New client connected {} ({})", identity.name, identity.id);
            let reply = WireMessage::handshake(&identity.id, &identity.name);
            return HandshakeOutcome::Accepted {
                identity,
                reply: Some(reply),
            };
        }

        let mut registry = self.registry.write().await;
        if let Some(record) = registry.find(&id) {
            if record.handle().is_open() && !record.handle().same_connection(conn) {
                warn!(
                    "Identity collision: {} is bound to connection {}, rejecting connection {}",
                    id,
                    record.handle().conn_id(),
                    conn.conn_id()
                );
                return HandshakeOutcome::Rejected { id };
            }

            let identity = ClientIdentity {
                id: record.id().to_string(),
                name: record.name().to_string(),
            };
            registry.rebind(&id, conn.clone());
            info!("Client reconnected {} ({})", identity.name, identity.id);
            return HandshakeOutcome::Accepted {
                identity,
                reply: None,
            };
        }

        // First sight of a client-supplied identity: accept it as
        // authoritative. A blank half is filled from the generators rather
        // than stored empty.
        let identity = ClientIdentity {
            id: if id.is_empty() {
                identity::unique_client_id()
            } else {
                id
            },
            name: if name.is_empty() {
                identity::display_name()
            } else {
                name
            },
        };
        registry.insert(ClientRecord::new(
            identity.id.clone(),
            identity.name.clone(),
            conn.clone(),
        ));
        info!("New client connected {} ({})", identity.name, identity.id);
        let reply = WireMessage::handshake(&identity.id, &identity.name);
        HandshakeOutcome::Accepted {
            identity,
            reply: Some(reply),
        }
    }

    /// Fan a chat payload out to every registered client except the sender.
    ///
    /// Exclusion is by connection identity, not by the id claimed in the
    /// payload. A failed send to one peer is logged and does not stop
    /// delivery to the rest, nor does it remove the peer (the sweep will).
    /// Returns the number of peers the payload was queued for.
    pub async fn relay_chat(&self, sender: &ConnectionHandle, msg: &WireMessage) -> usize {
        let payload = match msg.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode chat payload: {}", e);
                return 0;
            }
        };

        if let WireMessage::Chat { id, name, message } = msg {
            debug!("({})[ {} ]: {}", id, name, message);
        }

        let registry = self.registry.read().await;
        let mut delivered = 0;
        for record in registry.records() {
            let handle = record.handle();
            if handle.same_connection(sender) || !handle.is_open() {
                continue;
            }
            match handle.send_text(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Failed to relay to {} ({}): {}", record.name(), record.id(), e);
                }
            }
        }
        delivered
    }

    /// Remove every registry entry whose connection is no longer open.
    ///
    /// Runs on a fixed interval; a dead connection may stay registered for
    /// up to one interval. Returns the number of records removed.
    pub async fn sweep(&self) -> usize {
        let removed = self
            .registry
            .write()
            .await
            .sweep_dead(|handle| handle.is_open());
        for record in &removed {
            info!("Client disconnected {} ({})", record.name(), record.id());
        }
        removed.len()
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}
