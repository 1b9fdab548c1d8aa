//! Observer registry with per-issue ordered delivery.

use crate::change::{ChangePublisher, IssueChange};
use civic_types::{Issue, IssueId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// What a subscription is interested in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    AllIssues,
    Issue(IssueId),
}

impl Scope {
    fn matches(&self, issue: &IssueId) -> bool {
        match self {
            Scope::AllIssues => true,
            Scope::Issue(id) => id == issue,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::AllIssues => f.write_str("*"),
            Scope::Issue(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// One observer. A change matching several of its scopes is still sent once.
struct Subscriber {
    scopes: HashSet<Scope>,
    tx: mpsc::UnboundedSender<IssueChange>,
}

impl Subscriber {
    fn wants(&self, issue: &IssueId) -> bool {
        self.scopes.iter().any(|scope| scope.matches(issue))
    }
}

/// Delivery cursor for one issue. Changes that arrive ahead of their
/// predecessors wait in `held` until the gap closes.
struct IssueCursor {
    next_revision: u64,
    held: BTreeMap<u64, IssueChange>,
}

impl Default for IssueCursor {
    fn default() -> Self {
        Self {
            next_revision: 1,
            held: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    cursors: HashMap<IssueId, IssueCursor>,
}

impl Registry {
    fn deliver(&mut self, change: &IssueChange) {
        let issue = change.issue.id;
        let mut closed = Vec::new();
        for (id, sub) in &self.subscribers {
            if sub.wants(&issue) && sub.tx.send(change.clone()).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
            debug!(subscription = id.0, "pruned closed subscription");
        }
    }
}

/// The observer registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct ChangeFanout {
    inner: Arc<Mutex<Registry>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChangeFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. The registration lasts as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.inner);
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscribers.insert(
            id,
            Subscriber {
                scopes: HashSet::from([scope]),
                tx,
            },
        );
        debug!(subscription = id.0, %scope, "observer subscribed");
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner).subscribers.remove(&id).is_some()
    }

    /// Widen a live subscription with another scope. Changes keep arriving on
    /// the same channel, so per-issue order holds across all of its scopes.
    /// Returns `false` if the subscription is gone or already had the scope.
    pub fn add_scope(&self, id: SubscriptionId, scope: Scope) -> bool {
        match lock(&self.inner).subscribers.get_mut(&id) {
            Some(sub) => sub.scopes.insert(scope),
            None => false,
        }
    }

    /// Drop one scope from a live subscription. Returns `false` if it did not
    /// have the scope.
    pub fn remove_scope(&self, id: SubscriptionId, scope: &Scope) -> bool {
        match lock(&self.inner).subscribers.get_mut(&id) {
            Some(sub) => sub.scopes.remove(scope),
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// Align delivery cursors with issues that already exist, e.g. after
    /// restoring a snapshot, so their next change is delivered immediately.
    pub fn resume_from<'a>(&self, issues: impl IntoIterator<Item = &'a Issue>) {
        let mut registry = lock(&self.inner);
        for issue in issues {
            let cursor = registry.cursors.entry(issue.id).or_default();
            cursor.next_revision = cursor.next_revision.max(issue.revision + 1);
        }
    }
}

impl ChangePublisher for ChangeFanout {
    fn publish(&self, change: IssueChange) {
        let mut registry = lock(&self.inner);
        let issue = change.issue.id;
        let revision = change.revision();
        let cursor = registry.cursors.entry(issue).or_default();

        if revision < cursor.next_revision {
            trace!(%issue, revision, "dropping already-delivered change");
            return;
        }
        if revision > cursor.next_revision {
            trace!(%issue, revision, waiting_for = cursor.next_revision, "holding early change");
            cursor.held.insert(revision, change);
            return;
        }

        let mut ready = vec![change];
        cursor.next_revision += 1;
        while let Some(next) = cursor.held.remove(&cursor.next_revision) {
            ready.push(next);
            cursor.next_revision += 1;
        }
        for change in &ready {
            registry.deliver(change);
        }
    }
}

/// A live registration. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<IssueChange>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The scopes currently covered, empty once unsubscribed.
    pub fn scopes(&self) -> Vec<Scope> {
        let Some(registry) = self.registry.upgrade() else {
            return Vec::new();
        };
        let registry = lock(&registry);
        registry
            .subscribers
            .get(&self.id)
            .map(|sub| sub.scopes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Wait for the next change. `None` once the fan-out has been dropped.
    pub async fn recv(&mut self) -> Option<IssueChange> {
        self.rx.recv().await
    }

    /// Take the next change if one is already queued.
    pub fn try_recv(&mut self) -> Option<IssueChange> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use civic_types::{Category, Coordinates, IssueStatus, Severity, Timestamp, VoterId};

    fn issue(seed: u8, revision: u64) -> Issue {
        Issue {
            id: IssueId::new([seed; 32]),
            reporter: VoterId::new("r"),
            title: "No internet".into(),
            question: "Is your fibre connection down?".into(),
            category: Category::Internet,
            severity: Severity::High,
            origin: Coordinates::new(0.0, 0.0),
            radius_meters: 1000.0,
            vote_threshold: 5,
            yes_votes: (revision - 1) as u32,
            no_votes: 0,
            status: IssueStatus::Active,
            created_at: Timestamp::new(1),
            updated_at: Timestamp::new(revision),
            expires_at: Timestamp::new(1000),
            revision,
            repost_count: 0,
            escalation_count: 0,
        }
    }

    #[test]
    fn delivers_to_matching_scopes_only() {
        let fanout = ChangeFanout::new();
        let mut all = fanout.subscribe(Scope::AllIssues);
        let mut one = fanout.subscribe(Scope::Issue(IssueId::new([1; 32])));
        let mut other = fanout.subscribe(Scope::Issue(IssueId::new([2; 32])));

        fanout.publish(IssueChange::created(issue(1, 1)));

        assert_eq!(all.try_recv().unwrap().kind, ChangeKind::Created);
        assert_eq!(one.try_recv().unwrap().issue.id, IssueId::new([1; 32]));
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn update_published_before_create_is_held() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::AllIssues);

        fanout.publish(IssueChange::updated(issue(1, 2)));
        assert!(sub.try_recv().is_none());

        fanout.publish(IssueChange::created(issue(1, 1)));
        assert_eq!(sub.try_recv().unwrap().kind, ChangeKind::Created);
        let update = sub.try_recv().unwrap();
        assert_eq!(update.kind, ChangeKind::Updated);
        assert_eq!(update.revision(), 2);
    }

    #[test]
    fn out_of_order_burst_is_reordered() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::AllIssues);

        for rev in [1, 4, 3, 2, 5] {
            let change = if rev == 1 {
                IssueChange::created(issue(1, rev))
            } else {
                IssueChange::updated(issue(1, rev))
            };
            fanout.publish(change);
        }
        let revisions: Vec<u64> = std::iter::from_fn(|| sub.try_recv())
            .map(|c| c.revision())
            .collect();
        assert_eq!(revisions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn duplicate_revision_not_redelivered() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::AllIssues);
        fanout.publish(IssueChange::created(issue(1, 1)));
        fanout.publish(IssueChange::created(issue(1, 1)));
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn issues_are_independent() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::AllIssues);
        fanout.publish(IssueChange::updated(issue(1, 2)));
        fanout.publish(IssueChange::created(issue(2, 1)));
        assert_eq!(sub.try_recv().unwrap().issue.id, IssueId::new([2; 32]));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let fanout = ChangeFanout::new();
        let sub = fanout.subscribe(Scope::AllIssues);
        assert_eq!(fanout.subscriber_count(), 1);
        drop(sub);
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[test]
    fn widened_subscription_gets_each_change_once_in_order() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::Issue(IssueId::new([1; 32])));
        assert!(fanout.add_scope(sub.id(), Scope::AllIssues));
        assert!(!fanout.add_scope(sub.id(), Scope::AllIssues));
        assert_eq!(sub.scopes().len(), 2);

        fanout.publish(IssueChange::updated(issue(1, 2)));
        fanout.publish(IssueChange::created(issue(1, 1)));
        fanout.publish(IssueChange::created(issue(2, 1)));

        let seen: Vec<(IssueId, u64)> = std::iter::from_fn(|| sub.try_recv())
            .map(|c| (c.issue.id, c.revision()))
            .collect();
        let (one, two) = (IssueId::new([1; 32]), IssueId::new([2; 32]));
        assert_eq!(seen, vec![(one, 1), (one, 2), (two, 1)]);
    }

    #[test]
    fn narrowed_subscription_stops_receiving_that_scope() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::AllIssues);
        let only = Scope::Issue(IssueId::new([2; 32]));
        fanout.add_scope(sub.id(), only);
        assert!(fanout.remove_scope(sub.id(), &Scope::AllIssues));
        assert!(!fanout.remove_scope(sub.id(), &Scope::AllIssues));
        assert_eq!(sub.scopes(), vec![only]);

        fanout.publish(IssueChange::created(issue(1, 1)));
        fanout.publish(IssueChange::created(issue(2, 1)));
        assert_eq!(sub.try_recv().unwrap().issue.id, IssueId::new([2; 32]));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn explicit_unsubscribe() {
        let fanout = ChangeFanout::new();
        let sub = fanout.subscribe(Scope::AllIssues);
        assert!(fanout.unsubscribe(sub.id()));
        assert!(!fanout.unsubscribe(sub.id()));
    }

    #[test]
    fn resume_from_skips_restored_history() {
        let fanout = ChangeFanout::new();
        let restored = issue(1, 7);
        fanout.resume_from([&restored]);
        let mut sub = fanout.subscribe(Scope::Issue(restored.id));
        fanout.publish(IssueChange::updated(issue(1, 8)));
        assert_eq!(sub.try_recv().unwrap().revision(), 8);
    }

    #[tokio::test]
    async fn recv_waits_for_change() {
        let fanout = ChangeFanout::new();
        let mut sub = fanout.subscribe(Scope::AllIssues);
        let publisher = fanout.clone();
        tokio::spawn(async move {
            publisher.publish(IssueChange::created(issue(3, 1)));
        });
        let change = sub.recv().await.unwrap();
        assert_eq!(change.issue.id, IssueId::new([3; 32]));
    }
}
