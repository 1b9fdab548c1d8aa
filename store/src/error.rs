use civic_types::IssueId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("issue not found: {0}")]
    NotFound(IssueId),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// The issue changed since it was read; re-read and try again.
    #[error("revision conflict on issue {issue}: expected {expected}, found {found}")]
    Conflict {
        issue: IssueId,
        expected: u64,
        found: u64,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store is corrupted: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
