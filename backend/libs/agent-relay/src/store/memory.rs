//! In-process message store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{MessageStore, PendingStats, RecipientQuery, SortOrder};
use crate::error::{RelayError, RelayResult};
use crate::message::{AckOutcome, Message, MessageStatus, NewMessage};

#[derive(Default)]
struct Inner {
    /// Insertion order, which is also `created_at` order
    messages: Vec<Message>,
    index: HashMap<Uuid, usize>,
    last_created_at: Option<DateTime<Utc>>,
}

/// Message store kept in memory behind a single lock.
///
/// Every operation takes the lock once, so `append` and `mark_acknowledged`
/// are atomic with respect to concurrent workers. `created_at` is clamped to
/// be non-decreasing, which keeps insertion order and time order identical.
///
/// [`set_available`](Self::set_available) simulates a backend outage: while
/// unavailable every call fails with `RelayError::Storage`.
pub struct InMemoryMessageStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every message in insertion order.
    pub fn all(&self) -> Vec<Message> {
        self.inner.read().messages.clone()
    }

    fn ensure_available(&self) -> RelayResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RelayError::Storage("in-memory store unavailable".to_string()))
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: NewMessage) -> RelayResult<Message> {
        message.validate_fields()?;
        self.ensure_available()?;

        let mut inner = self.inner.write();

        let mut id = Uuid::new_v4();
        while inner.index.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let now = Utc::now();
        let created_at = match inner.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        inner.last_created_at = Some(created_at);

        let stored = message.into_message(id, created_at);
        let position = inner.messages.len();
        inner.messages.push(stored.clone());
        inner.index.insert(id, position);

        debug!(
            message_id = %stored.id,
            message_type = %stored.message_type,
            recipient = %stored.recipient,
            "Message appended"
        );

        Ok(stored)
    }

    async fn query_by_recipient(
        &self,
        recipient: &str,
        query: &RecipientQuery,
    ) -> RelayResult<Vec<Message>> {
        self.ensure_available()?;

        let inner = self.inner.read();
        let matching = |m: &&Message| m.recipient == recipient && query.accepts(m);
        let limit = query.effective_limit();

        let messages = match query.order {
            SortOrder::OldestFirst => inner
                .messages
                .iter()
                .filter(matching)
                .take(limit)
                .cloned()
                .collect(),
            SortOrder::NewestFirst => inner
                .messages
                .iter()
                .rev()
                .filter(matching)
                .take(limit)
                .cloned()
                .collect(),
        };

        Ok(messages)
    }

    async fn query_by_context(&self, context_id: &str) -> RelayResult<Vec<Message>> {
        self.ensure_available()?;

        let inner = self.inner.read();
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.context_id.as_deref() == Some(context_id))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> RelayResult<Option<Message>> {
        self.ensure_available()?;

        let inner = self.inner.read();
        Ok(inner.index.get(&id).map(|&pos| inner.messages[pos].clone()))
    }

    async fn mark_acknowledged(&self, id: Uuid, by: &str) -> RelayResult<AckOutcome> {
        self.ensure_available()?;

        let mut inner = self.inner.write();
        let pos = *inner.index.get(&id).ok_or(RelayError::MessageNotFound(id))?;
        let message = &mut inner.messages[pos];

        if message.status != MessageStatus::Sent {
            debug!(message_id = %id, status = %message.status, "Message already acknowledged");
            return Ok(AckOutcome::AlreadyAcknowledged(message.clone()));
        }

        message.status = MessageStatus::Acknowledged;
        message.acknowledged_by = Some(by.to_string());
        message.acknowledged_at = Some(Utc::now());

        debug!(message_id = %id, acknowledged_by = %by, "Message acknowledged");

        Ok(AckOutcome::Acknowledged(message.clone()))
    }

    async fn mark_processed(&self, id: Uuid) -> RelayResult<Message> {
        self.ensure_available()?;

        let mut inner = self.inner.write();
        let pos = *inner.index.get(&id).ok_or(RelayError::MessageNotFound(id))?;
        let message = &mut inner.messages[pos];

        match message.status {
            MessageStatus::Processed => Ok(message.clone()),
            MessageStatus::Acknowledged => {
                message.status = MessageStatus::Processed;
                debug!(message_id = %id, "Message processed");
                Ok(message.clone())
            }
            MessageStatus::Sent => Err(RelayError::IllegalTransition {
                id,
                from: MessageStatus::Sent,
                to: MessageStatus::Processed,
            }),
        }
    }

    async fn ping(&self) -> RelayResult<()> {
        self.ensure_available()
    }

    async fn pending_stats(&self, recipient: Option<&str>) -> RelayResult<PendingStats> {
        self.ensure_available()?;

        let inner = self.inner.read();
        let mut pending = inner
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .filter(|m| recipient.map_or(true, |r| m.recipient == r))
            .peekable();

        let oldest_age_seconds = pending
            .peek()
            .map(|m| (Utc::now() - m.created_at).num_seconds().max(0))
            .unwrap_or(0);

        Ok(PendingStats {
            pending: pending.count() as i64,
            oldest_age_seconds,
        })
    }
}
