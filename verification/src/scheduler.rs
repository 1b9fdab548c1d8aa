//! Escalation and repost scheduler.
//!
//! One call to [`IssueEngine::run_scheduler_tick`] reviews every issue whose
//! expiry lies strictly before the tick's start. Each decision is taken on a
//! fresh read and committed with a revision check, so a vote that lands first
//! is always seen and a second pass in the same tick finds nothing to do.

use crate::engine::IssueEngine;
use crate::error::EngineError;
use crate::state::Transition;
use civic_fanout::IssueChange;
use civic_types::{EscalationReason, Issue, IssueId, IssueStatus, Timestamp};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What one scheduler pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick_start: Timestamp,
    pub examined: usize,
    pub verified: usize,
    pub reposted: usize,
    pub reescalated: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Review {
    /// Nothing to do: acted on already, or no longer reviewable.
    Skip,
    /// A last-moment vote met the threshold.
    Verify,
    Repost,
    Reescalate,
    Expire,
}

impl IssueEngine {
    fn review(&self, issue: &Issue, tick_start: Timestamp) -> Review {
        if !issue.is_past_expiry(tick_start) {
            return Review::Skip;
        }
        match issue.status {
            IssueStatus::Active if self.state_machine().qualifies(issue) => Review::Verify,
            IssueStatus::Active if issue.radius_meters < self.params.max_radius_meters => {
                Review::Repost
            }
            IssueStatus::Active => Review::Expire,
            IssueStatus::Verified if issue.escalation_count < self.params.max_escalations => {
                Review::Reescalate
            }
            IssueStatus::Verified => Review::Expire,
            _ => Review::Skip,
        }
    }

    fn apply_review(&self, issue: &Issue, review: Review, tick_start: Timestamp) -> Issue {
        let window = self.params.profile(issue.severity).window_secs;
        let mut next = issue.clone();
        next.updated_at = tick_start;
        match review {
            Review::Skip => {}
            Review::Verify => {
                next.status = IssueStatus::Verified;
                next.expires_at = tick_start.plus_secs(window);
                next.escalation_count = 1;
            }
            Review::Repost => {
                next.radius_meters = (issue.radius_meters * self.params.radius_expansion_factor)
                    .min(self.params.max_radius_meters);
                next.expires_at = tick_start.plus_secs(window);
                next.repost_count += 1;
            }
            Review::Reescalate => {
                next.expires_at = tick_start.plus_secs(window);
                next.escalation_count += 1;
            }
            Review::Expire => next.status = IssueStatus::Expired,
        }
        next
    }

    /// Review and commit one issue. Returns the decision and, unless it was
    /// `Skip`, the issue as stored before and after.
    fn process_expired(
        &self,
        id: &IssueId,
        tick_start: Timestamp,
    ) -> Result<(Review, Option<(Issue, Issue)>), EngineError> {
        self.retry_on_conflict(*id, || {
            let current = self.store.get_issue(id)?;
            let review = self.review(&current, tick_start);
            if review == Review::Skip {
                return Ok((review, None));
            }
            let next = self.apply_review(&current, review, tick_start);
            let stored = self.store.update_issue(current.revision, &next)?;
            Ok((review, Some((current, stored))))
        })
    }

    /// Publish the committed change, then log and escalate. Publishing comes
    /// first so a failing notifier cannot stall the issue's fan-out cursor.
    fn report_review(&self, review: Review, before: &Issue, after: &Issue) {
        if review == Review::Skip {
            return;
        }
        self.publish(IssueChange::updated(after.clone()));
        let transition = Transition {
            from: before.status,
            to: after.status,
        };
        match review {
            Review::Skip => {}
            Review::Verify => {
                self.log_transition(after, &transition);
                if let Some(reason) = transition.escalation(after.severity) {
                    self.escalate(after, reason);
                }
            }
            Review::Repost => {
                self.stats.increment("issues_reposted");
                info!(
                    issue = %after.id,
                    from_radius_m = before.radius_meters,
                    to_radius_m = after.radius_meters,
                    yes = after.yes_votes,
                    threshold = after.vote_threshold,
                    repost = after.repost_count,
                    expires_at = %after.expires_at,
                    transition = "repost",
                    "issue reposted with wider reach"
                );
            }
            Review::Reescalate => self.escalate(after, EscalationReason::Unacknowledged),
            Review::Expire => {
                self.stats.increment("issues_expired");
                self.log_transition(after, &transition);
            }
        }
    }

    /// Run one scheduler pass at the clock's current time.
    ///
    /// A failure on one issue is logged and counted; the rest of the batch is
    /// still processed. Only a failure to list candidates aborts the pass.
    pub fn run_scheduler_tick(&self) -> Result<TickReport, EngineError> {
        let tick_start = self.clock.now();
        let candidates = self.store.expired_before(tick_start)?;
        let mut report = TickReport {
            tick_start,
            examined: candidates.len(),
            ..TickReport::default()
        };

        for id in &candidates {
            match self.process_expired(id, tick_start) {
                Ok((review, changed)) => {
                    if let Some((before, after)) = &changed {
                        self.report_review(review, before, after);
                    }
                    match review {
                        Review::Skip => report.skipped += 1,
                        Review::Verify => report.verified += 1,
                        Review::Repost => report.reposted += 1,
                        Review::Reescalate => report.reescalated += 1,
                        Review::Expire => report.expired += 1,
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(issue = %id, error = %e, "scheduler could not process issue");
                }
            }
        }

        if report.examined > report.skipped {
            info!(
                examined = report.examined,
                verified = report.verified,
                reposted = report.reposted,
                reescalated = report.reescalated,
                expired = report.expired,
                failed = report.failed,
                "scheduler tick complete"
            );
        } else {
            debug!(examined = report.examined, "scheduler tick found nothing to do");
        }
        Ok(report)
    }
}
