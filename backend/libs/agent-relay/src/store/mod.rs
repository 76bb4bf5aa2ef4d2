//! Message persistence.
//!
//! The relay core talks to storage only through [`MessageStore`], so the
//! client and worker are independent of the backend. Two implementations
//! ship with the crate: [`InMemoryMessageStore`] and the PostgreSQL-backed
//! [`PgMessageStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelayResult;
use crate::message::{AckOutcome, Message, MessageStatus, NewMessage};

mod memory;
mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::PgMessageStore;

/// Default and upper bound for recipient queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Creation-time ordering of query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Reverse-chronological
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filters for [`MessageStore::query_by_recipient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientQuery {
    pub message_type: Option<String>,
    pub context_id: Option<String>,
    pub status: Option<MessageStatus>,
    pub order: SortOrder,
    pub limit: usize,
}

impl Default for RecipientQuery {
    fn default() -> Self {
        Self {
            message_type: None,
            context_id: None,
            status: None,
            order: SortOrder::NewestFirst,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl RecipientQuery {
    /// Unacknowledged messages, oldest first: the delivery query.
    pub fn pending(limit: usize) -> Self {
        Self {
            status: Some(MessageStatus::Sent),
            order: SortOrder::OldestFirst,
            limit,
            ..Self::default()
        }
    }

    /// Limit clamped to `1..=MAX_QUERY_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_QUERY_LIMIT)
    }

    /// Whether `message` passes the non-recipient filters.
    pub fn accepts(&self, message: &Message) -> bool {
        self.message_type
            .as_deref()
            .map_or(true, |t| message.message_type == t)
            && self
                .context_id
                .as_deref()
                .map_or(true, |c| message.context_id.as_deref() == Some(c))
            && self.status.map_or(true, |s| message.status == s)
    }
}

/// Backlog snapshot for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingStats {
    /// Messages still `SENT`
    pub pending: i64,
    /// Age in seconds of the oldest `SENT` message (0 when none)
    pub oldest_age_seconds: i64,
}

/// Durable, queryable message persistence.
///
/// Implementations must make `append` conflict-free on `id` and
/// `mark_acknowledged` a single atomic conditional update, because several
/// workers may poll overlapping recipient sets.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message, assigning `id` and `created_at`.
    ///
    /// # Errors
    ///
    /// `RelayError::Validation` if a required field is empty or too long;
    /// a storage error if the backend rejects the write.
    async fn append(&self, message: NewMessage) -> RelayResult<Message>;

    /// Messages addressed to `recipient`, filtered and bounded by `query`.
    async fn query_by_recipient(
        &self,
        recipient: &str,
        query: &RecipientQuery,
    ) -> RelayResult<Vec<Message>>;

    /// All messages sharing `context_id`, oldest first.
    async fn query_by_context(&self, context_id: &str) -> RelayResult<Vec<Message>>;

    /// Fetch a single message.
    async fn get(&self, id: Uuid) -> RelayResult<Option<Message>>;

    /// Move a message from `SENT` to `ACKNOWLEDGED`.
    ///
    /// Idempotent: a message already acknowledged (or processed) is returned
    /// unchanged as [`AckOutcome::AlreadyAcknowledged`].
    ///
    /// # Errors
    ///
    /// `RelayError::MessageNotFound` for an unknown id.
    async fn mark_acknowledged(&self, id: Uuid, by: &str) -> RelayResult<AckOutcome>;

    /// Move a message from `ACKNOWLEDGED` to `PROCESSED`.
    ///
    /// Idempotent on `PROCESSED`; a `SENT` message fails with
    /// `RelayError::IllegalTransition`.
    async fn mark_processed(&self, id: Uuid) -> RelayResult<Message>;

    /// Cheap read proving the backend is reachable.
    async fn ping(&self) -> RelayResult<()>;

    /// Pending count and oldest pending age, optionally for one recipient.
    async fn pending_stats(&self, recipient: Option<&str>) -> RelayResult<PendingStats>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;
    use chrono::Utc;

    #[test]
    fn test_pending_query() {
        let query = RecipientQuery::pending(25);
        assert_eq!(query.status, Some(MessageStatus::Sent));
        assert_eq!(query.order, SortOrder::OldestFirst);
        assert_eq!(query.effective_limit(), 25);
    }

    #[test]
    fn test_effective_limit_is_bounded() {
        let query = RecipientQuery {
            limit: 0,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), 1);

        let query = RecipientQuery {
            limit: 1_000_000,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), MAX_QUERY_LIMIT);
    }

    #[test]
    fn test_accepts_filters() {
        let message = NewMessage::new("A", "B", "QUERY", Payload::new())
            .with_context("ctx")
            .into_message(Uuid::new_v4(), Utc::now());

        assert!(RecipientQuery::default().accepts(&message));
        assert!(RecipientQuery::pending(10).accepts(&message));

        let by_type = RecipientQuery {
            message_type: Some("ERROR".to_string()),
            ..Default::default()
        };
        assert!(!by_type.accepts(&message));

        let by_context = RecipientQuery {
            context_id: Some("other".to_string()),
            ..Default::default()
        };
        assert!(!by_context.accepts(&message));

        let acked = RecipientQuery {
            status: Some(MessageStatus::Acknowledged),
            ..Default::default()
        };
        assert!(!acked.accepts(&message));
    }
}
