//! Error codes and the per-session error record

use std::fmt;

/// Raw result code of the last operation.
///
/// The numeric values are stable: they are what the legacy command channel
/// and the `/augeas/error` projection speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    NoError = 0,
    NoMemory = 1,
    Internal = 2,
    PathX = 3,
    NoMatch = 4,
    MultipleMatches = 5,
    Syntax = 6,
    NoLens = 7,
    MultipleTransforms = 8,
    NoSpan = 9,
    MoveDescendant = 10,
    CmdRun = 11,
    BadArg = 12,
    Label = 13,
    CopyDescendant = 14,
    FileAccess = 15,
}

const ALL_CODES: [ErrorCode; 16] = [
    ErrorCode::NoError,
    ErrorCode::NoMemory,
    ErrorCode::Internal,
    ErrorCode::PathX,
    ErrorCode::NoMatch,
    ErrorCode::MultipleMatches,
    ErrorCode::Syntax,
    ErrorCode::NoLens,
    ErrorCode::MultipleTransforms,
    ErrorCode::NoSpan,
    ErrorCode::MoveDescendant,
    ErrorCode::CmdRun,
    ErrorCode::BadArg,
    ErrorCode::Label,
    ErrorCode::CopyDescendant,
    ErrorCode::FileAccess,
];

impl ErrorCode {
    /// Short name used as the value of `/augeas/error`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::NoError => "noerror",
            ErrorCode::NoMemory => "nomem",
            ErrorCode::Internal => "internal",
            ErrorCode::PathX => "pathx",
            ErrorCode::NoMatch => "nomatch",
            ErrorCode::MultipleMatches => "mmatch",
            ErrorCode::Syntax => "syntax",
            ErrorCode::NoLens => "nolens",
            ErrorCode::MultipleTransforms => "mxfm",
            ErrorCode::NoSpan => "nospan",
            ErrorCode::MoveDescendant => "mvdesc",
            ErrorCode::CmdRun => "cmdrun",
            ErrorCode::BadArg => "badarg",
            ErrorCode::Label => "label",
            ErrorCode::CopyDescendant => "cpdesc",
            ErrorCode::FileAccess => "fileaccess",
        }
    }

    /// Human-readable message for the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::NoError => "No error",
            ErrorCode::NoMemory => "Cannot allocate memory",
            ErrorCode::Internal => "Internal error (please file a bug)",
            ErrorCode::PathX => "Invalid path expression",
            ErrorCode::NoMatch => "No match for path expression",
            ErrorCode::MultipleMatches => "Too many matches for path expression",
            ErrorCode::Syntax => "Syntax error in lens definition",
            ErrorCode::NoLens => "Lens not found",
            ErrorCode::MultipleTransforms => "Multiple transforms",
            ErrorCode::NoSpan => "Node has no span info",
            ErrorCode::MoveDescendant => "Cannot move node into its descendant",
            ErrorCode::CmdRun => "Failed to execute command",
            ErrorCode::BadArg => "Invalid argument in function call",
            ErrorCode::Label => "Invalid label",
            ErrorCode::CopyDescendant => "Cannot copy node into its descendant",
            ErrorCode::FileAccess => "Cannot access file",
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        ALL_CODES.iter().copied().find(|c| *c as i32 == raw)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_CODES.iter().copied().find(|c| c.name() == name)
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::NoError
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of the most recent operation of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorRecord {
    pub fn none() -> Self {
        Self::new(ErrorCode::NoError, None)
    }

    pub fn new(code: ErrorCode, details: Option<String>) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            details,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// `"{message} {details}"`, or just the message without details.
    pub fn full_message(&self) -> String {
        match &self.details {
            Some(details) if !details.is_empty() => format!("{} {}", self.message, details),
            _ => self.message.clone(),
        }
    }
}

impl Default for ErrorRecord {
    fn default() -> Self {
        Self::none()
    }
}
