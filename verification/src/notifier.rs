//! Default authority notifier: record escalations in the log.

use civic_types::{AuthorityNotifier, EscalationReason, Issue};
use tracing::warn;

/// Writes every escalation as a `warn` event, for deployments with no
/// authority integration wired in yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl AuthorityNotifier for LogNotifier {
    fn escalate(&self, issue: &Issue, reason: EscalationReason) {
        warn!(
            issue = %issue.id,
            category = %issue.category,
            severity = %issue.severity,
            status = %issue.status,
            reason = reason.as_str(),
            latitude = issue.origin.latitude,
            longitude = issue.origin.longitude,
            title = %issue.title,
            "authority escalation"
        );
    }
}
