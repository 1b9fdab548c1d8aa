//! Verification state machine.
//!
//! Derives an issue's status from its tallies, severity and authority input.
//! Pure: callers apply the returned transitions inside their atomic write.

use crate::error::EngineError;
use civic_types::{CriticalPolicy, EngineParams, EscalationReason, Issue, IssueStatus, Severity, VoteRecord};

/// A committed change of status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: IssueStatus,
    pub to: IssueStatus,
}

impl Transition {
    /// Why the authorities must hear about this transition, if at all.
    pub fn escalation(&self, severity: Severity) -> Option<EscalationReason> {
        if self.to != IssueStatus::Verified {
            return None;
        }
        Some(if severity == Severity::Critical {
            EscalationReason::Critical
        } else {
            EscalationReason::Verified
        })
    }
}

pub struct VerificationStateMachine<'a> {
    params: &'a EngineParams,
}

impl<'a> VerificationStateMachine<'a> {
    pub fn new(params: &'a EngineParams) -> Self {
        Self { params }
    }

    fn corroboration_required(&self, issue: &Issue) -> bool {
        issue.severity == Severity::Critical
            && self.params.critical_policy == CriticalPolicy::FirstCorroboration
    }

    /// Whether the current tally (or severity) qualifies an active issue.
    ///
    /// Critical issues under [`CriticalPolicy::FirstCorroboration`] are judged
    /// vote by vote in [`Self::after_vote`], never by the tally alone, so the
    /// reporter's own corroboration cannot verify them.
    pub fn qualifies(&self, issue: &Issue) -> bool {
        if issue.severity == Severity::Critical {
            return !self.corroboration_required(issue);
        }
        issue.has_reached_threshold()
    }

    /// Status a freshly built issue starts in.
    pub fn status_at_creation(&self, issue: &Issue) -> IssueStatus {
        if self.qualifies(issue) {
            IssueStatus::Verified
        } else {
            IssueStatus::Active
        }
    }

    /// Transition triggered by an accepted vote. `issue` already includes the
    /// vote in its tally.
    pub fn after_vote(&self, issue: &Issue, vote: &VoteRecord) -> Option<Transition> {
        if issue.status != IssueStatus::Active {
            return None;
        }
        let verified = if self.corroboration_required(issue) {
            vote.in_favor && vote.voter != issue.reporter
        } else {
            self.qualifies(issue)
        };
        verified.then_some(Transition {
            from: IssueStatus::Active,
            to: IssueStatus::Verified,
        })
    }

    /// Validate an authority command. Only the immediate successor along
    /// verified → acknowledged → in_progress → resolved is accepted.
    pub fn authority_advance(
        &self,
        current: IssueStatus,
        target: IssueStatus,
    ) -> Result<Transition, EngineError> {
        match current.authority_successor() {
            Some(next) if next == target => Ok(Transition {
                from: current,
                to: target,
            }),
            _ => Err(EngineError::InvalidTransition {
                from: current,
                to: target,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::{Category, Coordinates, IssueId, Timestamp, VoterId};

    fn issue(severity: Severity, yes: u32, threshold: u32) -> Issue {
        Issue {
            id: IssueId::new([5; 32]),
            reporter: VoterId::new("reporter"),
            title: "Gas smell".into(),
            question: "Can you smell gas near the market?".into(),
            category: Category::Safety,
            severity,
            origin: Coordinates::new(0.0, 0.0),
            radius_meters: 500.0,
            vote_threshold: threshold,
            yes_votes: yes,
            no_votes: 0,
            status: IssueStatus::Active,
            created_at: Timestamp::new(0),
            updated_at: Timestamp::new(0),
            expires_at: Timestamp::new(3600),
            revision: 1,
            repost_count: 0,
            escalation_count: 0,
        }
    }

    fn yes_from(issue: &Issue, voter: &str) -> VoteRecord {
        VoteRecord {
            issue: issue.id,
            voter: VoterId::new(voter),
            in_favor: true,
            location: issue.origin,
            cast_at: Timestamp::new(1),
        }
    }

    #[test]
    fn threshold_flips_exactly_when_reached() {
        let params = EngineParams::default();
        let sm = VerificationStateMachine::new(&params);
        let below = issue(Severity::Medium, 9, 10);
        assert_eq!(sm.after_vote(&below, &yes_from(&below, "v9")), None);
        let at = issue(Severity::Medium, 10, 10);
        assert_eq!(
            sm.after_vote(&at, &yes_from(&at, "v10")),
            Some(Transition {
                from: IssueStatus::Active,
                to: IssueStatus::Verified
            })
        );
    }

    #[test]
    fn critical_immediate_verifies_at_creation() {
        let params = EngineParams::default();
        let sm = VerificationStateMachine::new(&params);
        assert_eq!(
            sm.status_at_creation(&issue(Severity::Critical, 0, 1)),
            IssueStatus::Verified
        );
        assert_eq!(
            sm.status_at_creation(&issue(Severity::High, 0, 5)),
            IssueStatus::Active
        );
    }

    #[test]
    fn critical_first_corroboration_ignores_reporter() {
        let params = EngineParams {
            critical_policy: CriticalPolicy::FirstCorroboration,
            ..EngineParams::default()
        };
        let sm = VerificationStateMachine::new(&params);
        let created = issue(Severity::Critical, 1, 1);
        assert_eq!(sm.status_at_creation(&created), IssueStatus::Active);

        let reporter_vote = yes_from(&created, "reporter");
        assert_eq!(sm.after_vote(&created, &reporter_vote), None);

        let neighbour = issue(Severity::Critical, 2, 1);
        assert!(sm.after_vote(&neighbour, &yes_from(&neighbour, "neighbour")).is_some());
    }

    #[test]
    fn no_vote_never_verifies_critical_under_corroboration() {
        let params = EngineParams {
            critical_policy: CriticalPolicy::FirstCorroboration,
            ..EngineParams::default()
        };
        let sm = VerificationStateMachine::new(&params);
        let i = issue(Severity::Critical, 0, 1);
        let mut no = yes_from(&i, "neighbour");
        no.in_favor = false;
        assert_eq!(sm.after_vote(&i, &no), None);
    }

    #[test]
    fn votes_on_verified_issue_do_not_transition() {
        let params = EngineParams::default();
        let sm = VerificationStateMachine::new(&params);
        let mut i = issue(Severity::High, 8, 5);
        i.status = IssueStatus::Verified;
        assert_eq!(sm.after_vote(&i, &yes_from(&i, "late")), None);
    }

    #[test]
    fn authority_moves_one_step_forward_only() {
        let params = EngineParams::default();
        let sm = VerificationStateMachine::new(&params);
        assert!(sm
            .authority_advance(IssueStatus::Verified, IssueStatus::Acknowledged)
            .is_ok());
        assert!(matches!(
            sm.authority_advance(IssueStatus::Verified, IssueStatus::Resolved),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(sm
            .authority_advance(IssueStatus::InProgress, IssueStatus::Acknowledged)
            .is_err());
        assert!(sm
            .authority_advance(IssueStatus::Active, IssueStatus::Verified)
            .is_err());
        assert!(sm
            .authority_advance(IssueStatus::Resolved, IssueStatus::Resolved)
            .is_err());
    }

    #[test]
    fn only_verification_escalates() {
        let t = Transition {
            from: IssueStatus::Active,
            to: IssueStatus::Verified,
        };
        assert_eq!(t.escalation(Severity::Critical), Some(EscalationReason::Critical));
        assert_eq!(t.escalation(Severity::Low), Some(EscalationReason::Verified));
        let ack = Transition {
            from: IssueStatus::Verified,
            to: IssueStatus::Acknowledged,
        };
        assert_eq!(ack.escalation(Severity::Critical), None);
    }
}
