//! WebSocket server implementation
//!
//! Accepts client connections, runs one task per connection, and drives the
//! periodic liveness sweep. Each connection gets an outbound queue whose
//! sending half becomes its [`ConnectionHandle`]; a writer task drains the
//! queue into the socket so broadcast never blocks on peer I/O.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::protocol::WireMessage;
use crate::relay::{ClientIdentity, ConnectionHandle, HandshakeOutcome, RelayServer};

/// Default interval between liveness sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the relay server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Interval between liveness sweeps
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Create a new server configuration with the default sweep interval
    pub fn new(bind: String, port: u16) -> Self {
        Self {
            bind,
            port,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Set the liveness sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// WebSocket front end for the relay
pub struct WebSocketServer {
    config: ServerConfig,
    relay: Arc<RelayServer>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketServer {
    /// Create a new server
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            relay: Arc::new(RelayServer::new()),
            shutdown_tx,
        }
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the server.
    ///
    /// Accepts connections until a shutdown signal arrives, spawning one
    /// task per connection. The liveness sweep runs here on its fixed
    /// interval so dead registry entries are reaped even when no traffic
    /// flows.
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("Relay listening on ws://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sweep = tokio::time::interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                // Accept new connections
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let relay = Arc::clone(&self.relay);
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, relay, shutdown_rx).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                // Reap registry entries whose connection has died
                _ = sweep.tick() => {
                    self.relay.sweep().await;
                }
                // Handle shutdown signal
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let remaining = self.relay.client_count().await;
        if remaining > 0 {
            info!("Shutting down with {} clients still registered", remaining);
        }

        Ok(())
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<RelayServer>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    info!("New connection from {}", peer_addr);

    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(outbound_tx);

    // Writer task: sole writer to the socket. Drains the outbound queue and
    // stops after flushing a close frame or on a send error.
    let writer_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
        writer_handle.mark_closed();
    });

    // Identity bound to this connection by its first accepted handshake.
    // Fixed for the connection's lifetime.
    let mut bound: Option<ClientIdentity> = None;

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received message from {}: {}", peer_addr, text);
                        if let ConnectionControl::Close =
                            dispatch_message(&relay, &handle, &mut bound, &text).await
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received binary message from {} ({} bytes), ignoring", peer_addr, data.len());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = handle.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pong messages
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} requested close", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {
                        // Raw frame, ignore
                    }
                    Some(Err(e)) => {
                        // Transport errors do not touch the registry; the
                        // sweep reaps the record if no reconnect happens.
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Connection closed by {}", peer_addr);
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, closing connection to {}", peer_addr);
                break;
            }
        }
    }

    // Flush a close frame, then mark the connection dead so the next sweep
    // can reap a record still bound to it.
    handle.close();
    handle.mark_closed();

    info!("Connection from {} closed", peer_addr);
    Ok(())
}

/// Whether the connection should stay up after processing a message
#[derive(Debug, PartialEq, Eq)]
enum ConnectionControl {
    Continue,
    Close,
}

/// Decode one inbound text frame and route it to the relay.
///
/// Decode failures and unknown discriminants drop the message and keep the
/// connection up; only a rejected handshake closes it.
async fn dispatch_message(
    relay: &RelayServer,
    handle: &ConnectionHandle,
    bound: &mut Option<ClientIdentity>,
    text: &str,
) -> ConnectionControl {
    match WireMessage::from_json(text) {
        Ok(WireMessage::Handshake { id, name }) => {
            if let Some(identity) = bound {
                if identity.id != id {
                    warn!(
                        "Connection {} attempted to change identity from {} to {:?}, ignoring",
                        handle.conn_id(),
                        identity.id,
                        id
                    );
                    return ConnectionControl::Continue;
                }
            }

            match relay.handshake(handle, id, name).await {
                HandshakeOutcome::Accepted { identity, reply } => {
                    if let Some(reply) = reply {
                        match reply.to_json() {
                            Ok(json) => {
                                if let Err(e) = handle.send_text(json) {
                                    warn!("Failed to send handshake reply: {}", e);
                                }
                            }
                            Err(e) => {
                                error!("Failed to encode handshake reply: {}", e);
                            }
                        }
                    }
                    *bound = Some(identity);
                    ConnectionControl::Continue
                }
                HandshakeOutcome::Rejected { id } => {
                    warn!(
                        "Closing connection {}: identity {} is bound to a live connection",
                        handle.conn_id(),
                        id
                    );
                    ConnectionControl::Close
                }
            }
        }
        Ok(msg @ WireMessage::Chat { .. }) => {
            relay.relay_chat(handle, &msg).await;
            ConnectionControl::Continue
        }
        Ok(WireMessage::Unknown) => {
            // Unrecognized discriminant is a no-op
            ConnectionControl::Continue
        }
        Err(e) => {
            warn!(
                "Dropping undecodable message from connection {}: {}",
                handle.conn_id(),
                e
            );
            ConnectionControl::Continue
        }
    }
}
