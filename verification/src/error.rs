use civic_store::StoreError;
use civic_types::{Coordinates, IssueId, IssueStatus, TypeError, VoterId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid location {0}")]
    InvalidLocation(Coordinates),

    #[error("{voter} has already voted on issue {issue}")]
    AlreadyVoted { issue: IssueId, voter: VoterId },

    #[error("voter is {distance_meters:.0} m from the issue, outside its {radius_meters:.0} m radius")]
    OutOfRange {
        distance_meters: f64,
        radius_meters: f64,
    },

    #[error("issue {issue} is {status} and no longer accepts votes")]
    IssueClosed { issue: IssueId, status: IssueStatus },

    #[error("cannot move issue from {from} to {to}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },

    #[error("caller is not authenticated")]
    NotAuthenticated,

    #[error("issue {issue} kept changing underneath the write ({attempts} attempts)")]
    PersistenceConflict { issue: IssueId, attempts: u32 },

    #[error("issue {0} not found")]
    NotFound(IssueId),

    #[error("invalid issue: {0}")]
    InvalidIssue(String),

    #[error("reporters may not vote on their own issue")]
    SelfVote,

    #[error("invalid engine parameters: {0}")]
    InvalidParams(#[from] TypeError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Conflict { issue, .. } => EngineError::PersistenceConflict { issue, attempts: 1 },
            other => EngineError::Store(other),
        }
    }
}

impl From<civic_geofence::GeofenceError> for EngineError {
    fn from(e: civic_geofence::GeofenceError) -> Self {
        match e {
            civic_geofence::GeofenceError::InvalidLocation(at) => EngineError::InvalidLocation(at),
        }
    }
}
