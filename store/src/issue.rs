//! Issue and vote storage trait.

use crate::StoreError;
use civic_types::{Issue, IssueId, Timestamp, VoteRecord, VoterId};

/// Storage for issues and their vote trails.
///
/// Writes use optimistic concurrency: the caller passes the revision it read,
/// and the store rejects the write with [`StoreError::Conflict`] if the issue
/// has moved on. Accepted writes are stored with `revision = expected + 1`.
pub trait IssueStore: Send + Sync {
    /// Store a brand-new issue together with any initial votes.
    ///
    /// Fails with [`StoreError::Duplicate`] if the id is taken.
    fn insert_issue(&self, issue: &Issue, initial_votes: &[VoteRecord]) -> Result<(), StoreError>;

    fn get_issue(&self, id: &IssueId) -> Result<Issue, StoreError>;

    /// All issues, newest first.
    fn list_issues(&self) -> Result<Vec<Issue>, StoreError>;

    /// The immutable vote trail of an issue, in cast order.
    fn votes_for(&self, id: &IssueId) -> Result<Vec<VoteRecord>, StoreError>;

    /// The issue and its vote trail, read atomically.
    fn issue_with_votes(&self, id: &IssueId) -> Result<(Issue, Vec<VoteRecord>), StoreError>;

    fn has_voted(&self, id: &IssueId, voter: &VoterId) -> Result<bool, StoreError>;

    /// Atomically append `vote` and replace the issue with `updated`.
    ///
    /// Fails with [`StoreError::Duplicate`] if the voter already voted on this
    /// issue, or [`StoreError::Conflict`] if the stored revision is not
    /// `expected_revision`. Either way nothing is written.
    fn append_vote(
        &self,
        vote: &VoteRecord,
        expected_revision: u64,
        updated: &Issue,
    ) -> Result<Issue, StoreError>;

    /// Atomically replace the issue with `updated` if its revision is still
    /// `expected_revision`.
    fn update_issue(&self, expected_revision: u64, updated: &Issue) -> Result<Issue, StoreError>;

    /// Ids of open (`active` or `verified`) issues whose expiry lies strictly
    /// before `cutoff`.
    fn expired_before(&self, cutoff: Timestamp) -> Result<Vec<IssueId>, StoreError>;
}
