//! Message shape shared by the store, client and worker.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Open, schema-less message body.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Maximum length of identity, type and context columns.
pub const MAX_FIELD_LEN: usize = 255;

/// Delivery status of a message.
///
/// Status only ever advances: `SENT -> ACKNOWLEDGED -> PROCESSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Appended, not yet consumed by the recipient
    Sent,
    /// Consumed by the recipient's handler
    Acknowledged,
    /// Work triggered by the message has finished
    Processed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "SENT",
            MessageStatus::Acknowledged => "ACKNOWLEDGED",
            MessageStatus::Processed => "PROCESSED",
        }
    }

    /// Whether `next` is the single legal successor of `self`.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Sent, MessageStatus::Acknowledged)
                | (MessageStatus::Acknowledged, MessageStatus::Processed)
        )
    }

    /// Whether the recipient has already consumed the message.
    pub fn is_acknowledged(&self) -> bool {
        *self >= MessageStatus::Acknowledged
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(MessageStatus::Sent),
            "ACKNOWLEDGED" => Ok(MessageStatus::Acknowledged),
            "PROCESSED" => Ok(MessageStatus::Processed),
            other => Err(format!("Unknown message status: {}", other)),
        }
    }
}

/// A stored message.
///
/// Everything except `status`, `acknowledged_by` and `acknowledged_at` is
/// immutable once the store has assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, assigned on append
    pub id: Uuid,

    /// Sending agent (from the allow-list)
    pub sender: String,

    /// Addressed agent (from the allow-list, or the broadcast identity)
    pub recipient: String,

    /// Message kind (from the configured enumeration)
    #[serde(rename = "type")]
    pub message_type: String,

    /// Message body
    pub payload: Payload,

    /// Correlation id grouping messages into one workflow
    pub context_id: Option<String>,

    pub status: MessageStatus,

    /// Set once by the store
    pub created_at: DateTime<Utc>,

    /// Agent that consumed the message (set at most once)
    pub acknowledged_by: Option<String>,

    /// When the message was consumed (set at most once)
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Sent
    }

    /// Look up a top-level payload field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }
}

/// A message draft handed to [`MessageStore::append`](crate::MessageStore::append).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: String,
    pub recipient: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Payload,
    pub context_id: Option<String>,
}

impl NewMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        message_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            message_type: message_type.into(),
            payload,
            context_id: None,
        }
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Structural checks every store applies before persisting.
    pub fn validate_fields(&self) -> Result<(), ValidationError> {
        check_field("sender", &self.sender)?;
        check_field("recipient", &self.recipient)?;
        check_field("type", &self.message_type)?;
        if let Some(context_id) = &self.context_id {
            check_field("context_id", context_id)?;
        }
        Ok(())
    }

    /// Turn the draft into a stored `SENT` message.
    pub fn into_message(self, id: Uuid, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            sender: self.sender,
            recipient: self.recipient,
            message_type: self.message_type,
            payload: self.payload,
            context_id: self.context_id,
            status: MessageStatus::Sent,
            created_at,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    let len = value.chars().count();
    if len > MAX_FIELD_LEN {
        return Err(ValidationError::FieldTooLong { field, len });
    }
    Ok(())
}

/// Result of acknowledging a message.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// This call moved the message from `SENT` to `ACKNOWLEDGED`
    Acknowledged(Message),
    /// The message had already been consumed; returned unchanged
    AlreadyAcknowledged(Message),
}

impl AckOutcome {
    pub fn message(&self) -> &Message {
        match self {
            AckOutcome::Acknowledged(m) | AckOutcome::AlreadyAcknowledged(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            AckOutcome::Acknowledged(m) | AckOutcome::AlreadyAcknowledged(m) => m,
        }
    }

    /// Whether this call performed the transition.
    pub fn is_first(&self) -> bool {
        matches!(self, AckOutcome::Acknowledged(_))
    }
}
