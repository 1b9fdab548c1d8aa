//! Change fan-out for issue mutations.
//!
//! Observers subscribe to a single issue or to every issue and receive
//! [`IssueChange`] events over their own channel. Delivery is at-least-once
//! and ordered per issue by revision: an update is never handed to an
//! observer before the creation event of the same issue. No ordering holds
//! across issues.

pub mod change;
pub mod registry;

pub use change::{ChangeKind, ChangePublisher, IssueChange};
pub use registry::{ChangeFanout, Scope, Subscription, SubscriptionId};
