//! Nullable infrastructure for deterministic testing.
//!
//! The engine reaches time, persistence and authority notification only
//! through traits. This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what they were asked to do
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod notifier;
pub mod store;

pub use clock::NullClock;
pub use notifier::{Escalation, NullNotifier};
pub use store::ConflictingStore;
