//! Change events emitted by the engine.

use civic_types::Issue;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    /// Removal by moderation. The engine itself never deletes issues.
    Deleted,
}

/// One committed mutation of an issue, carrying the issue as stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssueChange {
    pub kind: ChangeKind,
    pub issue: Issue,
}

impl IssueChange {
    pub fn created(issue: Issue) -> Self {
        Self {
            kind: ChangeKind::Created,
            issue,
        }
    }

    pub fn updated(issue: Issue) -> Self {
        Self {
            kind: ChangeKind::Updated,
            issue,
        }
    }

    pub fn revision(&self) -> u64 {
        self.issue.revision
    }
}

/// Sink for committed changes.
pub trait ChangePublisher: Send + Sync {
    fn publish(&self, change: IssueChange);
}
