//! Community issue verification engine.
//!
//! - **Intake** validates reports and resolves severity defaults.
//! - **Vote ledger** checks eligibility and commits each vote atomically with
//!   its tally update and any status transition.
//! - **State machine** decides verification and authority-driven progress.
//! - **Scheduler** reposts, re-escalates or expires issues whose window ran out.
//!
//! Persistence, time, change fan-out and authority notification are injected
//! as collaborators through [`Collaborators`].

pub mod engine;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod notifier;
pub mod query;
pub mod scheduler;
pub mod state;

pub use engine::{Collaborators, IssueEngine, STAT_NAMES};
pub use error::EngineError;
pub use intake::{NewIssue, ValidatedIssue};
pub use ledger::VoteAccepted;
pub use notifier::LogNotifier;
pub use query::{IssueQuery, TallyAudit};
pub use scheduler::TickReport;
pub use state::{Transition, VerificationStateMachine};
