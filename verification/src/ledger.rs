//! The vote ledger: eligibility checks and the atomic vote commit.

use crate::engine::IssueEngine;
use crate::error::EngineError;
use crate::state::Transition;
use civic_fanout::IssueChange;
use civic_store::StoreError;
use civic_types::{Coordinates, Issue, IssueId, IssueStatus, VoteRecord, VoterId};
use tracing::debug;

/// Outcome of an accepted vote.
#[derive(Clone, Debug)]
pub struct VoteAccepted {
    /// The issue as committed, tally and status included.
    pub issue: Issue,
    pub vote: VoteRecord,
    /// Set when this vote moved the issue to a new status.
    pub transition: Option<Transition>,
}

impl IssueEngine {
    /// Record one community vote.
    ///
    /// The duplicate check, tally update, status transition and vote append
    /// commit as a single store write. Lost races are re-read and retried.
    pub fn cast_vote(
        &self,
        voter: &VoterId,
        id: &IssueId,
        in_favor: bool,
        location: Coordinates,
    ) -> Result<VoteAccepted, EngineError> {
        let result = self.try_cast_vote(voter, id, in_favor, location);
        match &result {
            Ok(accepted) => self.after_vote_committed(accepted),
            Err(e) => {
                self.stats.increment("votes_rejected");
                debug!(issue = %id, voter = %voter, error = %e, "vote rejected");
            }
        }
        result
    }

    fn try_cast_vote(
        &self,
        voter: &VoterId,
        id: &IssueId,
        in_favor: bool,
        location: Coordinates,
    ) -> Result<VoteAccepted, EngineError> {
        if !voter.is_authenticated() {
            return Err(EngineError::NotAuthenticated);
        }
        if !location.is_valid() {
            return Err(EngineError::InvalidLocation(location));
        }

        self.retry_on_conflict(*id, || {
            let current = self.store.get_issue(id)?;
            if !current.status.accepts_votes() {
                return Err(EngineError::IssueClosed {
                    issue: *id,
                    status: current.status,
                });
            }
            if self.store.has_voted(id, voter)? {
                return Err(EngineError::AlreadyVoted {
                    issue: *id,
                    voter: voter.clone(),
                });
            }
            if current.reporter == *voter && !self.params.allow_reporter_vote {
                return Err(EngineError::SelfVote);
            }

            let reach = civic_geofence::evaluate(&current.origin, current.radius_meters, &location)?;
            if !reach.is_eligible() {
                return Err(EngineError::OutOfRange {
                    distance_meters: reach.distance_meters,
                    radius_meters: reach.radius_meters,
                });
            }

            let now = self.clock.now();
            let vote = VoteRecord {
                issue: *id,
                voter: voter.clone(),
                in_favor,
                location,
                cast_at: now,
            };

            let mut next = current.clone();
            if in_favor {
                next.yes_votes += 1;
            } else {
                next.no_votes += 1;
            }
            next.updated_at = now;
            let transition = self.state_machine().after_vote(&next, &vote);
            if let Some(t) = transition {
                next.status = t.to;
                if t.to == IssueStatus::Verified {
                    // Authorities get a fresh window to acknowledge.
                    next.expires_at = now.plus_secs(self.params.profile(next.severity).window_secs);
                    next.escalation_count = 1;
                }
            }

            let issue = self
                .store
                .append_vote(&vote, current.revision, &next)
                .map_err(|e| match e {
                    StoreError::Duplicate(_) => EngineError::AlreadyVoted {
                        issue: *id,
                        voter: voter.clone(),
                    },
                    other => other.into(),
                })?;
            Ok(VoteAccepted {
                issue,
                vote,
                transition,
            })
        })
    }

    fn after_vote_committed(&self, accepted: &VoteAccepted) {
        let issue = &accepted.issue;
        self.stats.increment("votes_accepted");
        debug!(
            issue = %issue.id,
            voter = %accepted.vote.voter,
            in_favor = accepted.vote.in_favor,
            yes = issue.yes_votes,
            no = issue.no_votes,
            progress = issue.progress_percent(),
            "vote accepted"
        );
        self.publish(IssueChange::updated(issue.clone()));
        if let Some(t) = &accepted.transition {
            self.log_transition(issue, t);
            if let Some(reason) = t.escalation(issue.severity) {
                self.escalate(issue, reason);
            }
        }
    }
}
