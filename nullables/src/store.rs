//! Nullable store wrapper: injects optimistic-write conflicts on demand.

use civic_store::{IssueStore, MemoryStore, StoreError};
use civic_types::{Issue, IssueId, Timestamp, VoteRecord, VoterId};
use std::sync::atomic::{AtomicU32, Ordering};

/// A [`MemoryStore`] whose next N conditional writes fail with
/// [`StoreError::Conflict`] without touching the data, as if another writer
/// had won the race each time.
#[derive(Default)]
pub struct ConflictingStore {
    inner: MemoryStore,
    pending: AtomicU32,
    injected: AtomicU32,
}

impl ConflictingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` conditional writes lose their race.
    pub fn fail_next_writes(&self, n: u32) {
        self.pending.store(n, Ordering::SeqCst);
    }

    /// How many conflicts have been injected so far.
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn maybe_conflict(&self, updated: &Issue, expected: u64) -> Result<(), StoreError> {
        let took = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                issue: updated.id,
                expected,
                found: expected + 1,
            });
        }
        Ok(())
    }
}

impl IssueStore for ConflictingStore {
    fn insert_issue(&self, issue: &Issue, initial_votes: &[VoteRecord]) -> Result<(), StoreError> {
        self.inner.insert_issue(issue, initial_votes)
    }

    fn get_issue(&self, id: &IssueId) -> Result<Issue, StoreError> {
        self.inner.get_issue(id)
    }

    fn list_issues(&self) -> Result<Vec<Issue>, StoreError> {
        self.inner.list_issues()
    }

    fn votes_for(&self, id: &IssueId) -> Result<Vec<VoteRecord>, StoreError> {
        self.inner.votes_for(id)
    }

    fn issue_with_votes(&self, id: &IssueId) -> Result<(Issue, Vec<VoteRecord>), StoreError> {
        self.inner.issue_with_votes(id)
    }

    fn has_voted(&self, id: &IssueId, voter: &VoterId) -> Result<bool, StoreError> {
        self.inner.has_voted(id, voter)
    }

    fn append_vote(
        &self,
        vote: &VoteRecord,
        expected_revision: u64,
        updated: &Issue,
    ) -> Result<Issue, StoreError> {
        self.maybe_conflict(updated, expected_revision)?;
        self.inner.append_vote(vote, expected_revision, updated)
    }

    fn update_issue(&self, expected_revision: u64, updated: &Issue) -> Result<Issue, StoreError> {
        self.maybe_conflict(updated, expected_revision)?;
        self.inner.update_issue(expected_revision, updated)
    }

    fn expired_before(&self, cutoff: Timestamp) -> Result<Vec<IssueId>, StoreError> {
        self.inner.expired_before(cutoff)
    }
}
