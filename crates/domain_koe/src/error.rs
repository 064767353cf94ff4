//! KOE domain errors
//!
//! Errors raised while parsing events on the read path and submissions on the
//! write path. Payload constraints report a `CoreError::Validation` from
//! [`Submission::validate`](crate::Submission::validate), and business rule
//! violations are a [`ValidationResult`](crate::validator::ValidationResult).

use thiserror::Error;

/// Errors that can occur in the KOE domain
#[derive(Debug, Error)]
pub enum KoeError {
    /// The `event_type` discriminant is not part of the event catalogue
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// A client supplied a field that only the store may assign
    #[error("Field '{0}' is assigned by the server and must not be supplied")]
    ServerOwnedField(String),

    /// The envelope or payload could not be decoded
    #[error("Malformed event: {0}")]
    Malformed(String),
}

impl KoeError {
    /// Creates a malformed-event error
    pub fn malformed(message: impl Into<String>) -> Self {
        KoeError::Malformed(message.into())
    }

    /// Returns the offending field, if the error can be attributed to one
    pub fn field(&self) -> Option<&str> {
        match self {
            KoeError::ServerOwnedField(field) => Some(field),
            KoeError::UnknownEventType(_) => Some("event_type"),
            KoeError::Malformed(_) => None,
        }
    }
}

impl From<serde_json::Error> for KoeError {
    fn from(error: serde_json::Error) -> Self {
        KoeError::Malformed(error.to_string())
    }
}
