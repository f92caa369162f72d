//! Public error type
//!
//! Every failure a caller sees is one of these. Except for `Argument` and
//! `Config`, each variant corresponds to one [`ErrorCode`] and carries the
//! full message (`"{message} {details}"`) of the session's error record.

use thiserror::Error;

use crate::domain::ErrorCode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AugError {
    #[error("{0}")]
    NoMemory(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    InvalidPath(String),

    #[error("{0}")]
    NoMatch(String),

    #[error("{0}")]
    MultipleMatches(String),

    #[error("{0}")]
    LensSyntax(String),

    #[error("{0}")]
    LensNotFound(String),

    #[error("{0}")]
    MultipleTransforms(String),

    #[error("{0}")]
    NoSpanInfo(String),

    /// Move into the node's own subtree.
    #[error("{0}")]
    Descendant(String),

    #[error("{0}")]
    CommandExecution(String),

    #[error("{0}")]
    BadArgument(String),

    #[error("{0}")]
    Label(String),

    /// Copy into the node's own subtree.
    #[error("{0}")]
    CopyDescendant(String),

    #[error("{0}")]
    FileOperation(String),

    /// Precondition checked before the operation runs; the error record is
    /// left untouched.
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("config error: {message}")]
    Config { message: String },
}

impl AugError {
    /// Typed error for a raw code; `None` for `noerror`.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let err = match code {
            ErrorCode::NoError => return None,
            ErrorCode::NoMemory => AugError::NoMemory(message),
            ErrorCode::Internal => AugError::Internal(message),
            ErrorCode::PathX => AugError::InvalidPath(message),
            ErrorCode::NoMatch => AugError::NoMatch(message),
            ErrorCode::MultipleMatches => AugError::MultipleMatches(message),
            ErrorCode::Syntax => AugError::LensSyntax(message),
            ErrorCode::NoLens => AugError::LensNotFound(message),
            ErrorCode::MultipleTransforms => AugError::MultipleTransforms(message),
            ErrorCode::NoSpan => AugError::NoSpanInfo(message),
            ErrorCode::MoveDescendant => AugError::Descendant(message),
            ErrorCode::CmdRun => AugError::CommandExecution(message),
            ErrorCode::BadArg => AugError::BadArgument(message),
            ErrorCode::Label => AugError::Label(message),
            ErrorCode::CopyDescendant => AugError::CopyDescendant(message),
            ErrorCode::FileAccess => AugError::FileOperation(message),
        };
        Some(err)
    }

    /// Raw code of the error; `Argument` and `Config` report `badarg`.
    pub fn code(&self) -> ErrorCode {
        match self {
            AugError::NoMemory(_) => ErrorCode::NoMemory,
            AugError::Internal(_) => ErrorCode::Internal,
            AugError::InvalidPath(_) => ErrorCode::PathX,
            AugError::NoMatch(_) => ErrorCode::NoMatch,
            AugError::MultipleMatches(_) => ErrorCode::MultipleMatches,
            AugError::LensSyntax(_) => ErrorCode::Syntax,
            AugError::LensNotFound(_) => ErrorCode::NoLens,
            AugError::MultipleTransforms(_) => ErrorCode::MultipleTransforms,
            AugError::NoSpanInfo(_) => ErrorCode::NoSpan,
            AugError::Descendant(_) => ErrorCode::MoveDescendant,
            AugError::CommandExecution(_) => ErrorCode::CmdRun,
            AugError::BadArgument(_) | AugError::Argument(_) | AugError::Config { .. } => ErrorCode::BadArg,
            AugError::Label(_) => ErrorCode::Label,
            AugError::CopyDescendant(_) => ErrorCode::CopyDescendant,
            AugError::FileOperation(_) => ErrorCode::FileAccess,
        }
    }
}

/// Result type of every public session operation.
pub type AugResult<T> = Result<T, AugError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ErrorCode::PathX)]
    #[case(ErrorCode::NoMatch)]
    #[case(ErrorCode::MultipleTransforms)]
    #[case(ErrorCode::CmdRun)]
    #[case(ErrorCode::FileAccess)]
    fn given_code_when_translating_then_variant_reports_same_code(#[case] code: ErrorCode) {
        let err = AugError::from_code(code, "msg").unwrap();
        assert_eq!(err.code(), code);
        assert_eq!(err.to_string(), "msg");
    }

    #[test]
    fn given_noerror_when_translating_then_none() {
        assert_eq!(AugError::from_code(ErrorCode::NoError, "x"), None);
    }
}
