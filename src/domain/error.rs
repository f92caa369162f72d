//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::record::ErrorCode;

/// Structural errors raised by the tree and the path evaluator.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// `details` is the expression with `|=|` at the failing position.
    #[error("invalid path expression: {reason}: {details}")]
    InvalidPath { reason: String, details: String },

    #[error("no match for path expression: {0}")]
    NoMatch(String),

    #[error("too many matches for path expression: {0}")]
    MultipleMatches(String),

    #[error("cannot create node for path expression: {0}")]
    NotCreatable(String),

    #[error("node is read-only: {0}")]
    ReadOnly(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("cannot move node into its descendant: {0}")]
    MoveIntoDescendant(String),

    #[error("cannot copy node into its descendant: {0}")]
    CopyIntoDescendant(String),

    #[error("node has no span info: {0}")]
    NoSpan(String),

    #[error("invalid argument: {0}")]
    BadArgument(String),
}

impl DomainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::InvalidPath { .. } | DomainError::NotCreatable(_) => ErrorCode::PathX,
            DomainError::NoMatch(_) => ErrorCode::NoMatch,
            DomainError::MultipleMatches(_) => ErrorCode::MultipleMatches,
            DomainError::ReadOnly(_) | DomainError::BadArgument(_) => ErrorCode::BadArg,
            DomainError::InvalidLabel(_) => ErrorCode::Label,
            DomainError::MoveIntoDescendant(_) => ErrorCode::MoveDescendant,
            DomainError::CopyIntoDescendant(_) => ErrorCode::CopyDescendant,
            DomainError::NoSpan(_) => ErrorCode::NoSpan,
        }
    }

    /// Text placed in the `details` field of the error record.
    pub fn details(&self) -> String {
        match self {
            DomainError::InvalidPath { reason, details } => format!("{details} ({reason})"),
            DomainError::NoMatch(s)
            | DomainError::MultipleMatches(s)
            | DomainError::NotCreatable(s)
            | DomainError::ReadOnly(s)
            | DomainError::InvalidLabel(s)
            | DomainError::MoveIntoDescendant(s)
            | DomainError::CopyIntoDescendant(s)
            | DomainError::NoSpan(s)
            | DomainError::BadArgument(s) => s.clone(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
