//! HTTP/JSON API for the civic node.
//!
//! Provides endpoints for:
//! - Reporting issues and listing the bulletin board
//! - Casting geofenced votes
//! - Authority status commands
//! - Vote trails and tally audits
//! - Engine statistics
//!
//! Callers identify themselves with the `x-user-id` header; the value is
//! supplied by an upstream identity layer and treated as opaque.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, RpcServer, USER_ID_HEADER};
