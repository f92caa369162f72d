//! Infrastructure-level errors (I/O and lens engine)

use thiserror::Error;

use crate::domain::ErrorCode;

/// Failures reported by a lens engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LensError {
    #[error("lens not found: {0}")]
    NotFound(String),

    #[error("malformed lens reference: {0}")]
    Syntax(String),

    /// Text could not be parsed; positions are 0-based byte offset, 1-based
    /// line and column.
    #[error("parse error at line {line}, char {char}: {message}")]
    Parse {
        message: String,
        pos: usize,
        line: usize,
        char: usize,
    },

    #[error("cannot produce text: {message}")]
    Put { message: String },
}

impl LensError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LensError::NotFound(_) => ErrorCode::NoLens,
            LensError::Syntax(_) => ErrorCode::Syntax,
            LensError::Parse { .. } | LensError::Put { .. } => ErrorCode::CmdRun,
        }
    }
}

/// Infrastructure errors add I/O-level concerns.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lens(#[from] LensError),
}

impl InfraError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            InfraError::Io { .. } => ErrorCode::FileAccess,
            InfraError::Lens(e) => e.code(),
        }
    }
}
