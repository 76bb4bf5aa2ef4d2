//! Error types for the agent relay library.

use thiserror::Error;
use uuid::Uuid;

use crate::message::MessageStatus;

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Malformed outbound message, rejected before any I/O.
///
/// Validation failures are always visible to the caller and never retried
/// automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Sender or recipient is not part of the configured allow-list
    #[error("Invalid {role}: '{agent}' is not a configured agent")]
    InvalidAgent { role: &'static str, agent: String },

    /// Message type is not part of the configured enumeration
    #[error("Invalid message type: '{0}'")]
    InvalidType(String),

    /// Payload does not satisfy the schema declared for its type
    #[error("Invalid payload for {message_type}: {reason}")]
    InvalidPayload { message_type: String, reason: String },

    /// A required field was empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field exceeded the storage column width
    #[error("Field {field} too long: {len} characters (max 255)")]
    FieldTooLong { field: &'static str, len: usize },
}

/// Errors that can occur during relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Message failed local validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend unavailable or write rejected
    #[error("Storage error: {0}")]
    Storage(String),

    /// Message not found in the store
    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    /// Requested status change would move a message backwards or skip a step
    #[error("Illegal status transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Worker start/stop called in the wrong state
    #[error("Worker state error: {0}")]
    WorkerState(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("Relay error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Check if this is a local validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, RelayError::Validation(_))
    }

    /// Check if this error originated in the storage backend
    pub fn is_storage(&self) -> bool {
        match self {
            RelayError::Database(_) | RelayError::Storage(_) => true,
            // Backend calls wrapped with `.context(..)`
            RelayError::Other(e) => e.downcast_ref::<sqlx::Error>().is_some(),
            _ => false,
        }
    }

    /// Check if error is transient (worth retrying on the next cycle)
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Database(sqlx_err) => is_transient_sqlx(sqlx_err),
            RelayError::Storage(_) => true,
            RelayError::Other(e) => e
                .downcast_ref::<sqlx::Error>()
                .map_or(false, is_transient_sqlx),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

/// An application handler failed while processing a delivered message.
///
/// Caught per message inside a worker cycle; the message stays `SENT` so a
/// later cycle delivers it again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Handler failed for message {message_id} ({message_type}): {reason}")]
pub struct HandlerError {
    pub message_id: Uuid,
    pub message_type: String,
    pub reason: String,
}

/// Repeated consecutive health-check failures reached the configured threshold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Worker for {agent} degraded after {consecutive_failures} consecutive health check failures: {last_error}")]
pub struct DegradedStateError {
    pub agent: String,
    pub consecutive_failures: u32,
    pub last_error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = RelayError::from(ValidationError::InvalidType("X".to_string()));
        assert!(err.is_validation());
        assert!(!err.is_storage());
        assert!(!err.is_transient());

        let err = RelayError::Storage("connection refused".to_string());
        assert!(err.is_storage());
        assert!(err.is_transient());

        let err = RelayError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_storage());
        assert!(err.is_transient());

        let err = RelayError::MessageNotFound(Uuid::nil());
        assert!(!err.is_storage());

        let wrapped: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = RelayError::from(anyhow::Context::context(wrapped, "Failed to fetch").unwrap_err());
        assert!(err.is_storage());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_context_wrapped_pool_errors_are_transient() {
        let wrapped: Result<(), sqlx::Error> = Err(sqlx::Error::PoolTimedOut);
        let err = RelayError::from(
            anyhow::Context::context(wrapped, "Failed to fetch messages by recipient").unwrap_err(),
        );
        assert!(err.is_storage());
        assert!(err.is_transient());

        let err = RelayError::from(anyhow::anyhow!("handler bug"));
        assert!(!err.is_storage());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidAgent {
            role: "recipient",
            agent: "C".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid recipient: 'C' is not a configured agent"
        );
    }
}
