//! Error taxonomy shared by the authoring editor, the respondent session and the backend.
//!
//! Every variant belongs to one `ErrorKind`. Validation and terminal-state errors are raised
//! locally before any network call; network errors come from a service seam.

use thiserror::Error;

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Refused locally with a user-facing warning; no network call was made.
    Validation,
    /// A service call failed; local state is unchanged.
    Network,
    /// Mutation of a locked exercise or a completed response.
    TerminalState,
    /// Malformed payload from a peer.
    Decode,
    NotFound,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("an exercise must keep at least one page")]
    LastPage,
    #[error("a choice tool must keep at least two options")]
    TooFewOptions,
    #[error("page {0} does not exist")]
    NoSuchPage(usize),
    #[error("tool {tool} does not exist on page {page}")]
    NoSuchTool { page: usize, tool: usize },
    #[error("option {0} does not exist")]
    NoSuchOption(usize),
    #[error("no tool named '{name}' on page {page}")]
    UnknownTool { page: usize, name: String },
    #[error("field '{field}' does not apply to a {tool_type} tool")]
    FieldMismatch { field: &'static str, tool_type: String },
    #[error("interaction does not apply to a {0} tool")]
    InteractionMismatch(String),
    #[error("'{0}' is not one of the tool's options")]
    NotAnOption(String),
    #[error("'{value}' is not a valid {tool_type} answer")]
    InvalidValue { tool_type: String, value: String },
    #[error("chat message must not be empty")]
    EmptyMessage,
    #[error("chat has not been started yet")]
    ChatNotInitiated,
    #[error("chat has already been started")]
    ChatAlreadyInitiated,
    #[error("a chat reply is still pending")]
    TurnInFlight,
    #[error("chat turn limit of {0} reached")]
    TurnLimitReached(u32),
    #[error("exercise must be saved before it can be locked")]
    NotPersisted,
    #[error("exercise is already locked")]
    AlreadyLocked,
    #[error("exercise is not locked")]
    NotLocked,
    #[error("confirmation does not match exercise '{0}'")]
    ConfirmationMismatch(String),
    /// Validation failure reported by a remote backend.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("exercise is locked; unlock it before editing")]
    ExerciseLocked,
    #[error("response has been submitted and is read-only")]
    ResponseCompleted,
    #[error("response was already submitted")]
    AlreadySubmitted,

    #[error("{0} not found")]
    NotFound(String),
    #[error("service call failed: {0}")]
    Service(String),
    #[error("could not decode payload: {0}")]
    Decode(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            ExerciseLocked | ResponseCompleted | AlreadySubmitted => ErrorKind::TerminalState,
            NotFound(_) => ErrorKind::NotFound,
            Service(_) => ErrorKind::Network,
            Decode(_) => ErrorKind::Decode,
            _ => ErrorKind::Validation,
        }
    }

    /// Short machine-readable code carried over HTTP.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation_failed",
            ErrorKind::Network => "service_unavailable",
            ErrorKind::TerminalState => match self {
                EngineError::ExerciseLocked => "exercise_locked",
                EngineError::AlreadySubmitted => "already_submitted",
                _ => "response_completed",
            },
            ErrorKind::Decode => "decode_failed",
            ErrorKind::NotFound => "not_found",
        }
    }

    /// Rebuild an error from a wire `{error, message}` pair.
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "exercise_locked" => EngineError::ExerciseLocked,
            "already_submitted" => EngineError::AlreadySubmitted,
            "response_completed" => EngineError::ResponseCompleted,
            "not_found" => EngineError::NotFound(message),
            "decode_failed" => EngineError::Decode(message),
            "validation_failed" => EngineError::Rejected(message),
            _ => EngineError::Service(message),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            EngineError::Decode(e.to_string())
        } else {
            EngineError::Service(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Decode(e.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
