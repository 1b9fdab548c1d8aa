//! Persistence contract for the issue verification engine.
//!
//! The engine's correctness rests on three operations being atomic with
//! respect to each other for the same issue:
//! - conditional vote insert enforcing one vote per (issue, voter),
//! - read-modify-write of the issue (tallies, status, expiry, radius),
//! - the query for issues whose expiry has passed.
//!
//! Every backend implements [`IssueStore`]; the rest of the workspace depends
//! only on the trait. [`MemoryStore`] is the in-process implementation.

pub mod error;
pub mod issue;
pub mod memory;
pub mod snapshot;

pub use error::StoreError;
pub use issue::IssueStore;
pub use memory::MemoryStore;
pub use snapshot::StoreSnapshot;
