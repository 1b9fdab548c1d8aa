//! Authority escalation collaborator.
//!
//! Delivering the notification (email, SMS, dashboards) is someone else's job;
//! the engine only decides *when* an issue must be forwarded.

use crate::issue::Issue;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// A critical issue bypassed the vote threshold.
    Critical,
    /// The community reached the vote threshold.
    Verified,
    /// A verified issue sat a whole window without acknowledgment.
    Unacknowledged,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::Critical => "critical",
            EscalationReason::Verified => "verified",
            EscalationReason::Unacknowledged => "unacknowledged",
        }
    }
}

/// Receives issues that must be forwarded to an external authority.
///
/// Called after the triggering mutation has committed. Implementations must
/// not block for long; queue the work instead.
pub trait AuthorityNotifier: Send + Sync {
    fn escalate(&self, issue: &Issue, reason: EscalationReason);
}
