//! Fundamental types for the civic issue verification engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! identifiers, timestamps, coordinates, the issue/vote data model, engine
//! parameters, and the traits for the external collaborators the engine
//! depends on (clock, authority notification).

pub mod error;
pub mod escalation;
pub mod id;
pub mod issue;
pub mod location;
pub mod params;
pub mod time;

pub use error::TypeError;
pub use escalation::{AuthorityNotifier, EscalationReason};
pub use id::{IssueId, VoterId};
pub use issue::{Category, Issue, IssueStatus, Severity, VoteRecord};
pub use location::Coordinates;
pub use params::{CriticalPolicy, EngineParams, SeverityProfile};
pub use time::{Clock, SystemClock, Timestamp};
