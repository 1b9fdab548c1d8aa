//! Wire messages and per-connection subscription bookkeeping.

use civic_fanout::{ChangeFanout, ChangeKind, IssueChange, Scope, Subscription, SubscriptionId};
use civic_types::{Issue, IssueId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::task::JoinHandle;

/// A request from a client.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Watch one issue, or every issue when `issue` is omitted.
    Subscribe {
        #[serde(default)]
        issue: Option<IssueId>,
    },
    Unsubscribe {
        #[serde(default)]
        issue: Option<IssueId>,
    },
    Ping,
}

/// A message pushed to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        issue: Option<IssueId>,
    },
    Change {
        kind: ChangeKind,
        issue: Issue,
    },
    Error {
        message: String,
    },
    Pong,
}

impl From<IssueChange> for ServerMessage {
    fn from(change: IssueChange) -> Self {
        ServerMessage::Change {
            kind: change.kind,
            issue: change.issue,
        }
    }
}

pub fn scope_of(issue: Option<IssueId>) -> Scope {
    match issue {
        Some(id) => Scope::Issue(id),
        None => Scope::AllIssues,
    }
}

/// The subscriptions of one connection.
///
/// A connection holds a single fan-out subscription, widened or narrowed as
/// the client adds and drops scopes, and a single forwarder task draining it.
/// Overlapping scopes (every issue plus one issue) therefore still deliver
/// each change once, in revision order.
#[derive(Default)]
pub struct ClientSubscriptions {
    scopes: HashSet<Scope>,
    feed: Option<Feed>,
}

struct Feed {
    id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

impl ClientSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `scope`. The first scope registers with the fan-out and
    /// hands the new subscription to `spawn_forwarder`. Returns `false` if the
    /// scope was already watched.
    pub fn add(
        &mut self,
        fanout: &ChangeFanout,
        scope: Scope,
        spawn_forwarder: impl FnOnce(Subscription) -> JoinHandle<()>,
    ) -> bool {
        if !self.scopes.insert(scope) {
            return false;
        }
        match &self.feed {
            Some(feed) => {
                fanout.add_scope(feed.id, scope);
            }
            None => {
                let subscription = fanout.subscribe(scope);
                self.feed = Some(Feed {
                    id: subscription.id(),
                    forwarder: spawn_forwarder(subscription),
                });
            }
        }
        true
    }

    /// Stop watching `scope`. Dropping the last scope stops the forwarder,
    /// which releases the fan-out subscription. Returns `false` if the scope
    /// was not watched.
    pub fn remove(&mut self, fanout: &ChangeFanout, scope: &Scope) -> bool {
        if !self.scopes.remove(scope) {
            return false;
        }
        if self.scopes.is_empty() {
            self.clear();
        } else if let Some(feed) = &self.feed {
            fanout.remove_scope(feed.id, scope);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
        if let Some(feed) = self.feed.take() {
            feed.forwarder.abort();
        }
    }
}

impl Drop for ClientSubscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}
