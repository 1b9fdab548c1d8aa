//! The issue/vote data model.
//!
//! An [`Issue`] is the aggregate root: its tallies are a materialised cache of
//! the [`VoteRecord`] trail, maintained atomically by the store.

use crate::error::TypeError;
use crate::id::{IssueId, VoterId};
use crate::location::Coordinates;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(TypeError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// What kind of local problem was reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Water,
    Power,
    Internet,
    Roads,
    Safety,
    Sanitation,
    Noise,
    Other,
}

string_enum!(Category, "category", {
    Water => "water",
    Power => "power",
    Internet => "internet",
    Roads => "roads",
    Safety => "safety",
    Sanitation => "sanitation",
    Noise => "noise",
    Other => "other",
});

/// How urgent an issue is. Drives the default threshold, radius and window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Lifecycle status of an issue.
///
/// The pipeline `Active → Verified → Acknowledged → InProgress → Resolved` only
/// moves forward. `Expired` is terminal and reachable from `Active` or
/// `Verified`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Active,
    Verified,
    Acknowledged,
    InProgress,
    Resolved,
    Expired,
}

string_enum!(IssueStatus, "status", {
    Active => "active",
    Verified => "verified",
    Acknowledged => "acknowledged",
    InProgress => "in_progress",
    Resolved => "resolved",
    Expired => "expired",
});

impl IssueStatus {
    /// Position along the forward pipeline. `None` for `Expired`.
    pub fn pipeline_rank(&self) -> Option<u8> {
        match self {
            IssueStatus::Active => Some(0),
            IssueStatus::Verified => Some(1),
            IssueStatus::Acknowledged => Some(2),
            IssueStatus::InProgress => Some(3),
            IssueStatus::Resolved => Some(4),
            IssueStatus::Expired => None,
        }
    }

    pub fn accepts_votes(&self) -> bool {
        matches!(self, IssueStatus::Active | IssueStatus::Verified)
    }

    /// The next status an authority command may move this one to.
    pub fn authority_successor(&self) -> Option<IssueStatus> {
        match self {
            IssueStatus::Verified => Some(IssueStatus::Acknowledged),
            IssueStatus::Acknowledged => Some(IssueStatus::InProgress),
            IssueStatus::InProgress => Some(IssueStatus::Resolved),
            _ => None,
        }
    }
}

/// A reported local problem pending community corroboration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub reporter: VoterId,
    pub title: String,
    /// The yes/no question put to nearby residents.
    pub question: String,
    pub category: Category,
    pub severity: Severity,
    pub origin: Coordinates,
    /// Current geofence radius. Grows on each repost.
    pub radius_meters: f64,
    pub vote_threshold: u32,
    pub yes_votes: u32,
    pub no_votes: u32,
    pub status: IssueStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
    /// Starts at 1 and increments on every committed mutation.
    pub revision: u64,
    pub repost_count: u32,
    pub escalation_count: u32,
}

impl Issue {
    pub fn has_reached_threshold(&self) -> bool {
        self.yes_votes >= self.vote_threshold
    }

    /// Verification progress in percent, capped at 100.
    pub fn progress_percent(&self) -> u8 {
        if self.vote_threshold == 0 {
            return 100;
        }
        let pct = (u64::from(self.yes_votes) * 100) / u64::from(self.vote_threshold);
        pct.min(100) as u8
    }

    /// Whether the expiry lies strictly before `at`.
    pub fn is_past_expiry(&self, at: Timestamp) -> bool {
        self.expires_at < at
    }

    pub fn total_votes(&self) -> u32 {
        self.yes_votes + self.no_votes
    }
}

/// One voter's immutable yes/no corroboration of an issue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub issue: IssueId,
    pub voter: VoterId,
    /// `true` for "yes, same here".
    pub in_favor: bool,
    /// Where the voter stood when the vote was cast.
    pub location: Coordinates,
    pub cast_at: Timestamp,
}
