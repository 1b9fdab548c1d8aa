//! In-memory issue store.
//!
//! Each issue lives behind its own mutex, so the uniqueness check, the vote
//! append and the tally update for one issue form a single critical section,
//! while different issues never contend. The outer map lock is only held long
//! enough to find or insert an issue's slot.

use crate::snapshot::StoreSnapshot;
use crate::{IssueStore, StoreError};
use civic_types::{Issue, IssueId, Timestamp, VoteRecord, VoterId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

struct IssueRecord {
    issue: Issue,
    votes: Vec<VoteRecord>,
    voters: HashSet<VoterId>,
}

impl IssueRecord {
    fn new(issue: Issue, initial_votes: &[VoteRecord]) -> Self {
        Self {
            issue,
            voters: initial_votes.iter().map(|v| v.voter.clone()).collect(),
            votes: initial_votes.to_vec(),
        }
    }

    fn check_revision(&self, expected: u64) -> Result<(), StoreError> {
        if self.issue.revision != expected {
            return Err(StoreError::Conflict {
                issue: self.issue.id,
                expected,
                found: self.issue.revision,
            });
        }
        Ok(())
    }

    fn commit(&mut self, expected: u64, updated: &Issue) -> Issue {
        let mut next = updated.clone();
        next.revision = expected + 1;
        self.issue = next.clone();
        next
    }
}

/// Thread-safe in-memory implementation of [`IssueStore`].
pub struct MemoryStore {
    issues: RwLock<HashMap<IssueId, Arc<Mutex<IssueRecord>>>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            issues: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, id: &IssueId) -> Result<Arc<Mutex<IssueRecord>>, StoreError> {
        self.issues
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    fn all_slots(&self) -> Result<Vec<Arc<Mutex<IssueRecord>>>, StoreError> {
        Ok(self.issues.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn lock(slot: &Mutex<IssueRecord>) -> Result<MutexGuard<'_, IssueRecord>, StoreError> {
        slot.lock().map_err(poisoned)
    }

    pub fn issue_count(&self) -> Result<usize, StoreError> {
        Ok(self.issues.read().map_err(poisoned)?.len())
    }

    /// Capture every issue and vote.
    pub fn snapshot(&self, taken_at: Timestamp) -> Result<StoreSnapshot, StoreError> {
        let mut issues = Vec::new();
        let mut votes = Vec::new();
        for slot in self.all_slots()? {
            let record = Self::lock(&slot)?;
            issues.push(record.issue.clone());
            votes.extend(record.votes.iter().cloned());
        }
        Ok(StoreSnapshot::new(taken_at, issues, votes))
    }

    /// Rebuild a store from a snapshot, rejecting it if any materialised tally
    /// disagrees with its vote trail.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let mut by_issue: HashMap<IssueId, Vec<VoteRecord>> = HashMap::new();
        for vote in snapshot.votes {
            by_issue.entry(vote.issue).or_default().push(vote);
        }

        let mut map = HashMap::new();
        for issue in snapshot.issues {
            let votes = by_issue.remove(&issue.id).unwrap_or_default();
            let yes = votes.iter().filter(|v| v.in_favor).count() as u32;
            let no = votes.len() as u32 - yes;
            if yes != issue.yes_votes || no != issue.no_votes {
                return Err(StoreError::Corruption(format!(
                    "issue {} tallies {}/{} disagree with trail {}/{}",
                    issue.id, issue.yes_votes, issue.no_votes, yes, no
                )));
            }
            let record = IssueRecord::new(issue, &votes);
            if record.voters.len() != record.votes.len() {
                return Err(StoreError::Corruption(format!(
                    "issue {} has duplicate voters",
                    record.issue.id
                )));
            }
            map.insert(record.issue.id, Arc::new(Mutex::new(record)));
        }
        if let Some(orphan) = by_issue.keys().next() {
            return Err(StoreError::Corruption(format!(
                "votes reference unknown issue {orphan}"
            )));
        }

        Ok(Self {
            issues: RwLock::new(map),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IssueStore for MemoryStore {
    fn insert_issue(&self, issue: &Issue, initial_votes: &[VoteRecord]) -> Result<(), StoreError> {
        let mut issues = self.issues.write().map_err(poisoned)?;
        if issues.contains_key(&issue.id) {
            return Err(StoreError::Duplicate(issue.id.to_string()));
        }
        issues.insert(
            issue.id,
            Arc::new(Mutex::new(IssueRecord::new(issue.clone(), initial_votes))),
        );
        Ok(())
    }

    fn get_issue(&self, id: &IssueId) -> Result<Issue, StoreError> {
        let slot = self.slot(id)?;
        let record = Self::lock(&slot)?;
        Ok(record.issue.clone())
    }

    fn list_issues(&self) -> Result<Vec<Issue>, StoreError> {
        let mut issues = Vec::new();
        for slot in self.all_slots()? {
            issues.push(Self::lock(&slot)?.issue.clone());
        }
        issues.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(issues)
    }

    fn votes_for(&self, id: &IssueId) -> Result<Vec<VoteRecord>, StoreError> {
        let slot = self.slot(id)?;
        let record = Self::lock(&slot)?;
        Ok(record.votes.clone())
    }

    fn issue_with_votes(&self, id: &IssueId) -> Result<(Issue, Vec<VoteRecord>), StoreError> {
        let slot = self.slot(id)?;
        let record = Self::lock(&slot)?;
        Ok((record.issue.clone(), record.votes.clone()))
    }

    fn has_voted(&self, id: &IssueId, voter: &VoterId) -> Result<bool, StoreError> {
        let slot = self.slot(id)?;
        let record = Self::lock(&slot)?;
        Ok(record.voters.contains(voter))
    }

    fn append_vote(
        &self,
        vote: &VoteRecord,
        expected_revision: u64,
        updated: &Issue,
    ) -> Result<Issue, StoreError> {
        if vote.issue != updated.id {
            return Err(StoreError::Backend(format!(
                "vote for {} cannot update issue {}",
                vote.issue, updated.id
            )));
        }
        let slot = self.slot(&vote.issue)?;
        let mut record = Self::lock(&slot)?;

        if record.voters.contains(&vote.voter) {
            return Err(StoreError::Duplicate(format!("{}/{}", vote.issue, vote.voter)));
        }
        record.check_revision(expected_revision)?;

        record.voters.insert(vote.voter.clone());
        record.votes.push(vote.clone());
        Ok(record.commit(expected_revision, updated))
    }

    fn update_issue(&self, expected_revision: u64, updated: &Issue) -> Result<Issue, StoreError> {
        let slot = self.slot(&updated.id)?;
        let mut record = Self::lock(&slot)?;
        record.check_revision(expected_revision)?;
        Ok(record.commit(expected_revision, updated))
    }

    fn expired_before(&self, cutoff: Timestamp) -> Result<Vec<IssueId>, StoreError> {
        let mut expired = Vec::new();
        for slot in self.all_slots()? {
            let record = Self::lock(&slot)?;
            if record.issue.status.accepts_votes() && record.issue.is_past_expiry(cutoff) {
                expired.push(record.issue.id);
            }
        }
        expired.sort();
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::{Category, Coordinates, IssueStatus, Severity};

    fn issue(seed: u8, created: u64, expires: u64) -> Issue {
        Issue {
            id: IssueId::new([seed; 32]),
            reporter: VoterId::new("reporter"),
            title: "Streetlight out".into(),
            question: "Is the streetlight on your corner out?".into(),
            category: Category::Power,
            severity: Severity::Low,
            origin: Coordinates::new(10.0, 10.0),
            radius_meters: 2000.0,
            vote_threshold: 15,
            yes_votes: 0,
            no_votes: 0,
            status: IssueStatus::Active,
            created_at: Timestamp::new(created),
            updated_at: Timestamp::new(created),
            expires_at: Timestamp::new(expires),
            revision: 1,
            repost_count: 0,
            escalation_count: 0,
        }
    }

    fn vote(issue: &Issue, voter: &str, in_favor: bool) -> VoteRecord {
        VoteRecord {
            issue: issue.id,
            voter: VoterId::new(voter),
            in_favor,
            location: issue.origin,
            cast_at: issue.created_at,
        }
    }

    fn tallied(issue: &Issue, in_favor: bool) -> Issue {
        let mut next = issue.clone();
        if in_favor {
            next.yes_votes += 1;
        } else {
            next.no_votes += 1;
        }
        next
    }

    #[test]
    fn insert_then_get() {
        let store = MemoryStore::new();
        let i = issue(1, 10, 100);
        store.insert_issue(&i, &[]).unwrap();
        assert_eq!(store.get_issue(&i.id).unwrap(), i);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let i = issue(1, 10, 100);
        store.insert_issue(&i, &[]).unwrap();
        assert!(matches!(
            store.insert_issue(&i, &[]),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn missing_issue_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_issue(&IssueId::new([9; 32])),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn append_vote_bumps_revision_and_trail() {
        let store = MemoryStore::new();
        let i = issue(1, 10, 100);
        store.insert_issue(&i, &[]).unwrap();

        let stored = store
            .append_vote(&vote(&i, "v1", true), 1, &tallied(&i, true))
            .unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.yes_votes, 1);
        assert_eq!(store.votes_for(&i.id).unwrap().len(), 1);
        assert!(store.has_voted(&i.id, &VoterId::new("v1")).unwrap());
    }

    #[test]
    fn second_vote_from_same_voter_is_duplicate() {
        let store = MemoryStore::new();
        let i = issue(1, 10, 100);
        store.insert_issue(&i, &[]).unwrap();
        let after = store
            .append_vote(&vote(&i, "v1", true), 1, &tallied(&i, true))
            .unwrap();

        let err = store
            .append_vote(&vote(&i, "v1", false), after.revision, &tallied(&after, false))
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.get_issue(&i.id).unwrap().no_votes, 0);
    }

    #[test]
    fn stale_revision_conflicts_without_writing() {
        let store = MemoryStore::new();
        let i = issue(1, 10, 100);
        store.insert_issue(&i, &[]).unwrap();
        store
            .append_vote(&vote(&i, "v1", true), 1, &tallied(&i, true))
            .unwrap();

        let err = store
            .append_vote(&vote(&i, "v2", true), 1, &tallied(&i, true))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, found: 2, .. }));
        assert_eq!(store.votes_for(&i.id).unwrap().len(), 1);
        assert!(!store.has_voted(&i.id, &VoterId::new("v2")).unwrap());
    }

    #[test]
    fn list_is_newest_first() {
        let store = MemoryStore::new();
        store.insert_issue(&issue(1, 10, 100), &[]).unwrap();
        store.insert_issue(&issue(2, 30, 100), &[]).unwrap();
        store.insert_issue(&issue(3, 20, 100), &[]).unwrap();
        let created: Vec<u64> = store
            .list_issues()
            .unwrap()
            .iter()
            .map(|i| i.created_at.as_secs())
            .collect();
        assert_eq!(created, vec![30, 20, 10]);
    }

    #[test]
    fn expired_before_is_strict() {
        let store = MemoryStore::new();
        store.insert_issue(&issue(1, 0, 100), &[]).unwrap();
        store.insert_issue(&issue(2, 0, 200), &[]).unwrap();
        assert!(store.expired_before(Timestamp::new(100)).unwrap().is_empty());
        assert_eq!(
            store.expired_before(Timestamp::new(101)).unwrap(),
            vec![IssueId::new([1; 32])]
        );
    }

    #[test]
    fn snapshot_round_trip_preserves_trail() {
        let store = MemoryStore::new();
        let i = issue(1, 10, 100);
        store.insert_issue(&i, &[]).unwrap();
        store
            .append_vote(&vote(&i, "v1", true), 1, &tallied(&i, true))
            .unwrap();

        let snap = store.snapshot(Timestamp::new(50)).unwrap();
        let restored = MemoryStore::from_snapshot(snap).unwrap();
        assert_eq!(restored.get_issue(&i.id).unwrap().yes_votes, 1);
        assert!(restored.has_voted(&i.id, &VoterId::new("v1")).unwrap());
    }

    #[test]
    fn snapshot_with_drifted_tally_rejected() {
        let mut i = issue(1, 10, 100);
        i.yes_votes = 2;
        let snap = StoreSnapshot::new(Timestamp::new(50), vec![i.clone()], vec![vote(&i, "v1", true)]);
        assert!(matches!(
            MemoryStore::from_snapshot(snap),
            Err(StoreError::Corruption(_))
        ));
    }
}
