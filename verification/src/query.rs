//! Read-side helpers: issue listing filters and tally audits.

use crate::error::EngineError;
use civic_types::{Category, Coordinates, Issue, IssueId, IssueStatus, Severity, VoteRecord};
use serde::{Deserialize, Serialize};

/// Default page size when `limit` is not specified.
pub const DEFAULT_LIMIT: usize = 50;

/// Largest page a single listing may return.
pub const MAX_LIMIT: usize = 500;

/// Filters and paging for [`crate::IssueEngine::list_issues`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IssueQuery {
    pub status: Option<IssueStatus>,
    pub category: Option<Category>,
    pub severity: Option<Severity>,
    /// Only issues whose current radius covers this point.
    pub near: Option<Coordinates>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl IssueQuery {
    /// Effective page size, clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub(crate) fn check(&self) -> Result<(), EngineError> {
        match self.near {
            Some(point) if !point.is_valid() => Err(EngineError::InvalidLocation(point)),
            _ => Ok(()),
        }
    }

    fn matches(&self, issue: &Issue) -> bool {
        if self.status.is_some_and(|s| s != issue.status) {
            return false;
        }
        if self.category.is_some_and(|c| c != issue.category) {
            return false;
        }
        if self.severity.is_some_and(|s| s != issue.severity) {
            return false;
        }
        match self.near {
            Some(point) => civic_geofence::is_eligible(&issue.origin, issue.radius_meters, &point)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Filter then page `issues`, preserving their order.
    pub(crate) fn apply(&self, issues: Vec<Issue>) -> Vec<Issue> {
        issues
            .into_iter()
            .filter(|i| self.matches(i))
            .skip(self.offset.unwrap_or(0))
            .take(self.effective_limit())
            .collect()
    }
}

/// An issue's stored tally next to a recount of its vote trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TallyAudit {
    pub issue: IssueId,
    pub stored_yes: u32,
    pub stored_no: u32,
    pub counted_yes: u32,
    pub counted_no: u32,
}

impl TallyAudit {
    pub fn new(issue: &Issue, votes: &[VoteRecord]) -> Self {
        let counted_yes = votes.iter().filter(|v| v.in_favor).count() as u32;
        Self {
            issue: issue.id,
            stored_yes: issue.yes_votes,
            stored_no: issue.no_votes,
            counted_yes,
            counted_no: votes.len() as u32 - counted_yes,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.stored_yes == self.counted_yes && self.stored_no == self.counted_no
    }
}
