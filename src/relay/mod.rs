//! Relay core
//!
//! The client registry and the identity/broadcast policies built on it.
//! The transport layer feeds connections and decoded messages in; this
//! module decides who is known, who gets rejected, and who receives what.

mod registry;
mod server;

pub use registry::{ClientRecord, ClientRegistry, ConnectionHandle, SendFailure};
pub use server::{ClientIdentity, HandshakeOutcome, RelayServer};
