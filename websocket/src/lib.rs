//! WebSocket server for real-time issue updates.
//!
//! Clients can subscribe to:
//! - Every issue (`{"action":"subscribe"}`)
//! - A single issue (`{"action":"subscribe","issue":"<id>"}`)
//!
//! Subscriptions belong to the connection and are released when it closes.

pub mod server;
pub mod subscriptions;

pub use server::{WebSocketServer, WsError, WsState};
pub use subscriptions::{ClientMessage, ServerMessage};
