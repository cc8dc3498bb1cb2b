//! WebSocket server module
//!
//! Accepts client connections, decodes wire messages, and routes them to
//! the relay core.

mod protocol;
mod websocket;

pub use protocol::*;
pub use websocket::*;
