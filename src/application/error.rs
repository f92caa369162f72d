//! Application-level errors (wraps domain and infrastructure errors)

use thiserror::Error;

use crate::application::translate::ERROR_HINT;
use crate::domain::{DomainError, ErrorCode};
use crate::infrastructure::InfraError;

/// Application errors wrap lower layers and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("config error: {message}")]
    Config { message: String },

    /// Operation failed as a whole; details live under `/augeas//error`.
    #[error("command failed: {context}")]
    CommandFailed { context: String },
}

impl ApplicationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApplicationError::Domain(e) => e.code(),
            ApplicationError::Infra(e) => e.code(),
            ApplicationError::Config { .. } => ErrorCode::BadArg,
            ApplicationError::CommandFailed { .. } => ErrorCode::CmdRun,
        }
    }

    /// Text placed in the `details` field of the error record.
    pub fn details(&self) -> String {
        match self {
            ApplicationError::Domain(e) => e.details(),
            ApplicationError::Infra(InfraError::Io { context, source }) => format!("{context}: {source}"),
            ApplicationError::Infra(e) => e.to_string(),
            ApplicationError::Config { message } => message.clone(),
            ApplicationError::CommandFailed { context } => format!("{context} (see {ERROR_HINT})"),
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
