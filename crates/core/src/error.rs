use thiserror::Error;

/// Malformed or missing payload data, detected before any collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("recipient at position {index} has an empty identifier")]
    MissingRecipient { index: usize },
    #[error("unknown priority '{0}'")]
    UnknownPriority(String),
}

/// Failures reported by an entity record store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record store rejected the record: {0}")]
    Rejected(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Failure to persist the notification for exactly one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("invalid notification: {0}")]
    Invalid(#[from] ValidationError),
    #[error("failed to persist notification: {0}")]
    Store(#[from] StoreError),
    #[error("notification write did not complete: {0}")]
    Aborted(String),
}

/// Failure of a batched escalation email.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("email escalation is disabled")]
    Disabled,
    #[error("email sender rejected the batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("email transport failed: {0}")]
    Transport(String),
    #[error("invalid email request: {0}")]
    Invalid(String),
}

/// Failure to materialise an organisation directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("organisation directory unavailable: {0}")]
    Unavailable(String),
}
