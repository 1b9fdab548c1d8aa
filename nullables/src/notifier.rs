//! Nullable authority notifier: records escalations instead of sending them.

use civic_types::{AuthorityNotifier, EscalationReason, Issue, IssueId};
use std::sync::Mutex;

/// One recorded `escalate` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Escalation {
    pub issue: IssueId,
    pub reason: EscalationReason,
    pub escalation_count: u32,
}

#[derive(Default)]
pub struct NullNotifier {
    sent: Mutex<Vec<Escalation>>,
}

impl NullNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every escalation so far, in call order.
    pub fn escalations(&self) -> Vec<Escalation> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn escalations_for(&self, issue: &IssueId) -> Vec<EscalationReason> {
        self.escalations()
            .into_iter()
            .filter(|e| e.issue == *issue)
            .map(|e| e.reason)
            .collect()
    }
}

impl AuthorityNotifier for NullNotifier {
    fn escalate(&self, issue: &Issue, reason: EscalationReason) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Escalation {
                issue: issue.id,
                reason,
                escalation_count: issue.escalation_count,
            });
        }
    }
}
