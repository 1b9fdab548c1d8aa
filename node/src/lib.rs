//! Civic node: hosts the issue verification engine.
//!
//! The node is the central coordinator that:
//! - Restores issues and vote trails from the last snapshot
//! - Runs the escalation/repost scheduler on a fixed cadence
//! - Serves the HTTP API and the WebSocket change stream
//! - Saves a snapshot on graceful shutdown

pub mod config;
pub mod error;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{CivicNode, SNAPSHOT_FILE};
pub use shutdown::{ShutdownController, ShutdownSignal};
