use thiserror::Error;

/// Failure taxonomy for the sync core. Validation and store failures are
/// synchronous to the mutation call and never broadcast; delivery failures
/// are local to one subscriber and never roll back a committed mutation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("store failure: {0}")]
    Store(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl SyncError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        SyncError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: i64) -> Self {
        SyncError::NotFound { kind, id }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized topic key: {0}")]
pub struct TopicParseError(pub String);
