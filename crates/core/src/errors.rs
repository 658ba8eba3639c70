use thiserror::Error;

/// A required field was absent or mistyped on an inbound payload.
/// Normalization fails fast; nothing is dispatched for the event.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedEventError {
    #[error("{kind} payload is missing required field `{field}`")]
    MissingField { kind: String, field: String },
    #[error("{kind} payload field `{field}` has the wrong type")]
    WrongFieldType { kind: String, field: String },
    #[error("{kind} payload is not a JSON object")]
    NotAnObject { kind: String },
}

impl MalformedEventError {
    pub fn missing(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField { kind: kind.into(), field: field.into() }
    }

    pub fn wrong_type(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::WrongFieldType { kind: kind.into(), field: field.into() }
    }
}

/// Raised while compiling a command table, before any dispatch happens.
/// A table either builds in full or not at all.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandTableError {
    #[error("command {position} has an invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { position: usize, pattern: String, reason: String },
    #[error("command {position} (`{pattern}`) references unknown handler `{handler}`")]
    UnknownHandler { position: usize, pattern: String, handler: String },
}

/// Failure inside a bound command handler. Contained at the dispatch
/// boundary; never reaches the transport layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Intentional early return. Never reported to the channel.
    #[error("handler aborted")]
    Abort,
    #[error("handler failed: {reason}")]
    Failed { reason: String },
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }
}
