//! Errors raised by the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid issue id: {0}")]
    InvalidIssueId(String),

    #[error("invalid engine parameters: {0}")]
    InvalidParams(String),
}
