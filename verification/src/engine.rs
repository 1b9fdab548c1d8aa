//! The issue engine. Ties intake, the vote ledger and the state machine to the
//! store, clock, fan-out and authority collaborators.

use crate::error::EngineError;
use crate::intake::NewIssue;
use crate::query::{IssueQuery, TallyAudit};
use crate::state::{Transition, VerificationStateMachine};
use civic_fanout::{ChangePublisher, IssueChange};
use civic_store::IssueStore;
use civic_types::{
    AuthorityNotifier, Clock, Coordinates, EngineParams, EscalationReason, Issue, IssueId, IssueStatus,
    VoteRecord, VoterId,
};
use civic_utils::{format_duration, StatsCounter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STAT_NAMES: &[&str] = &[
    "issues_created",
    "votes_accepted",
    "votes_rejected",
    "issues_verified",
    "issues_reposted",
    "issues_expired",
    "escalations",
    "status_advances",
    "persistence_conflicts",
];

/// External collaborators the engine depends on.
pub struct Collaborators {
    pub store: Arc<dyn IssueStore>,
    pub clock: Arc<dyn Clock>,
    pub publisher: Arc<dyn ChangePublisher>,
    pub notifier: Arc<dyn AuthorityNotifier>,
}

pub struct IssueEngine {
    pub(crate) store: Arc<dyn IssueStore>,
    pub(crate) clock: Arc<dyn Clock>,
    publisher: Arc<dyn ChangePublisher>,
    notifier: Arc<dyn AuthorityNotifier>,
    pub(crate) params: EngineParams,
    pub(crate) stats: StatsCounter,
    nonce: AtomicU64,
}

impl IssueEngine {
    pub fn new(params: EngineParams, collaborators: Collaborators) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self {
            store: collaborators.store,
            clock: collaborators.clock,
            publisher: collaborators.publisher,
            notifier: collaborators.notifier,
            params,
            stats: StatsCounter::new(STAT_NAMES),
            nonce: AtomicU64::new(0),
        })
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    pub(crate) fn state_machine(&self) -> VerificationStateMachine<'_> {
        VerificationStateMachine::new(&self.params)
    }

    /// Run `op` until it stops losing optimistic-write races, up to the
    /// configured retry budget. Only `PersistenceConflict` is retried.
    pub(crate) fn retry_on_conflict<T>(
        &self,
        issue: IssueId,
        mut op: impl FnMut() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let attempts = self.params.max_conflict_retries + 1;
        let mut attempt = 1;
        loop {
            match op() {
                Err(EngineError::PersistenceConflict { .. }) => {
                    self.stats.increment("persistence_conflicts");
                    if attempt >= attempts {
                        warn!(%issue, attempts, "giving up after repeated write conflicts");
                        return Err(EngineError::PersistenceConflict { issue, attempts });
                    }
                    debug!(%issue, attempt, "write lost a race, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub(crate) fn publish(&self, change: IssueChange) {
        self.publisher.publish(change);
    }

    pub(crate) fn escalate(&self, issue: &Issue, reason: EscalationReason) {
        self.stats.increment("escalations");
        info!(
            issue = %issue.id,
            severity = %issue.severity,
            reason = reason.as_str(),
            escalation = issue.escalation_count,
            "escalating issue to authorities"
        );
        self.notifier.escalate(issue, reason);
    }

    pub(crate) fn log_transition(&self, issue: &Issue, transition: &Transition) {
        if transition.to == IssueStatus::Verified {
            self.stats.increment("issues_verified");
        }
        info!(
            issue = %issue.id,
            from = %transition.from,
            to = %transition.to,
            yes = issue.yes_votes,
            threshold = issue.vote_threshold,
            transition = "advance",
            "issue status changed"
        );
    }

    // ── Intake ───────────────────────────────────────────────────────────

    /// File a new report. The issue starts `active`, or `verified` when its
    /// severity or an implicit reporter corroboration already qualifies it.
    pub fn create_issue(&self, reporter: &VoterId, report: NewIssue) -> Result<Issue, EngineError> {
        if !reporter.is_authenticated() {
            return Err(EngineError::NotAuthenticated);
        }
        let valid = report.validate(&self.params)?;
        let now = self.clock.now();
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let id = IssueId::derive(reporter, now, nonce);

        let mut initial_votes = Vec::new();
        if self.params.count_reporter_corroboration {
            initial_votes.push(VoteRecord {
                issue: id,
                voter: reporter.clone(),
                in_favor: true,
                location: valid.origin,
                cast_at: now,
            });
        }

        let mut issue = Issue {
            id,
            reporter: reporter.clone(),
            title: valid.title,
            question: valid.question,
            category: valid.category,
            severity: valid.severity,
            origin: valid.origin,
            radius_meters: valid.radius_meters,
            vote_threshold: valid.vote_threshold,
            yes_votes: initial_votes.len() as u32,
            no_votes: 0,
            status: IssueStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: now.plus_secs(valid.window_secs),
            revision: 1,
            repost_count: 0,
            escalation_count: 0,
        };

        let status = self.state_machine().status_at_creation(&issue);
        let transition = (status != IssueStatus::Active).then_some(Transition {
            from: IssueStatus::Active,
            to: status,
        });
        if transition.is_some() {
            issue.status = status;
            issue.escalation_count = 1;
        }

        self.store.insert_issue(&issue, &initial_votes)?;
        self.stats.increment("issues_created");
        info!(
            issue = %issue.id,
            reporter = %reporter,
            category = %issue.category,
            severity = %issue.severity,
            radius_m = issue.radius_meters,
            threshold = issue.vote_threshold,
            window = %format_duration(valid.window_secs),
            "issue reported"
        );

        self.publish(IssueChange::created(issue.clone()));
        if let Some(t) = transition {
            self.log_transition(&issue, &t);
            if let Some(reason) = t.escalation(issue.severity) {
                self.escalate(&issue, reason);
            }
        }
        Ok(issue)
    }

    // ── Authority commands ───────────────────────────────────────────────

    /// Apply an authority's status-advance command.
    pub fn advance_status(
        &self,
        authority: &VoterId,
        id: &IssueId,
        target: IssueStatus,
    ) -> Result<Issue, EngineError> {
        if !authority.is_authenticated() {
            return Err(EngineError::NotAuthenticated);
        }
        let (stored, transition) = self.retry_on_conflict(*id, || {
            let current = self.store.get_issue(id)?;
            let transition = self.state_machine().authority_advance(current.status, target)?;
            let mut next = current.clone();
            next.status = target;
            next.updated_at = self.clock.now();
            let stored = self.store.update_issue(current.revision, &next)?;
            Ok((stored, transition))
        })?;

        self.stats.increment("status_advances");
        self.log_transition(&stored, &transition);
        debug!(issue = %id, authority = %authority, "authority command applied");
        self.publish(IssueChange::updated(stored.clone()));
        Ok(stored)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn get_issue(&self, id: &IssueId) -> Result<Issue, EngineError> {
        Ok(self.store.get_issue(id)?)
    }

    /// Issues matching `query`, newest first.
    pub fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, EngineError> {
        query.check()?;
        let issues = self.store.list_issues()?;
        Ok(query.apply(issues))
    }

    /// Open issues whose current geofence covers `location`: what a resident
    /// standing there may vote on.
    pub fn issues_near(&self, location: Coordinates) -> Result<Vec<Issue>, EngineError> {
        if !location.is_valid() {
            return Err(EngineError::InvalidLocation(location));
        }
        let mut near = Vec::new();
        for issue in self.store.list_issues()? {
            if issue.status.accepts_votes()
                && civic_geofence::is_eligible(&issue.origin, issue.radius_meters, &location)?
            {
                near.push(issue);
            }
        }
        Ok(near)
    }

    pub fn votes_for(&self, id: &IssueId) -> Result<Vec<VoteRecord>, EngineError> {
        Ok(self.store.votes_for(id)?)
    }

    /// Recount an issue's tally from its vote trail.
    pub fn audit_tally(&self, id: &IssueId) -> Result<TallyAudit, EngineError> {
        let (issue, votes) = self.store.issue_with_votes(id)?;
        Ok(TallyAudit::new(&issue, &votes))
    }
}
