//! Relay client: the single entry point agents use to communicate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::{RelayResult, ValidationError};
use crate::message::{AckOutcome, Message, NewMessage, Payload};
use crate::metrics::RelayMetrics;
use crate::store::{MessageStore, PendingStats, RecipientQuery};
use crate::thread::{ContextThread, WorkflowVerdict};

/// Filters accepted by [`RelayClient::receive`].
pub type ReceiveFilter = RecipientQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of [`RelayClient::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Cause when unhealthy
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Outbound message fields, for callers that prefer a struct over
/// positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub sender: String,
    pub recipient: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub context_id: Option<String>,
}

/// Validating front end over a [`MessageStore`].
///
/// Shape checks (allow-list, type enumeration, payload schema) run locally
/// and fail fast before any storage call is made.
pub struct RelayClient<S: MessageStore> {
    store: Arc<S>,
    config: Arc<RelayConfig>,
    metrics: Option<RelayMetrics>,
}

impl<S: MessageStore> Clone for RelayClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: MessageStore> RelayClient<S> {
    pub fn new(store: Arc<S>, config: Arc<RelayConfig>) -> Self {
        Self {
            store,
            config,
            metrics: None,
        }
    }

    /// Create a client that also counts sent messages.
    pub fn new_with_metrics(store: Arc<S>, config: Arc<RelayConfig>, metrics: RelayMetrics) -> Self {
        Self {
            store,
            config,
            metrics: Some(metrics),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and append one message.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidAgent`, `InvalidType` or `InvalidPayload`
    /// before touching storage; storage errors from the append itself.
    pub async fn send(
        &self,
        sender: &str,
        recipient: &str,
        message_type: &str,
        payload: Payload,
        context_id: Option<&str>,
    ) -> RelayResult<Message> {
        let mut draft = NewMessage::new(sender, recipient, message_type, payload);
        draft.context_id = context_id.map(str::to_string);
        self.send_draft(draft).await
    }

    pub async fn send_message(&self, message: OutboundMessage) -> RelayResult<Message> {
        self.send_draft(NewMessage {
            sender: message.sender,
            recipient: message.recipient,
            message_type: message.message_type,
            payload: message.payload,
            context_id: message.context_id,
        })
        .await
    }

    async fn send_draft(&self, draft: NewMessage) -> RelayResult<Message> {
        if let Err(e) = self.validate(&draft) {
            warn!(
                sender = %draft.sender,
                recipient = %draft.recipient,
                message_type = %draft.message_type,
                error = %e,
                "Rejected outbound message"
            );
            return Err(e.into());
        }

        let stored = self.store.append(draft).await?;

        if let Some(metrics) = &self.metrics {
            metrics.sent.inc();
        }

        debug!(
            message_id = %stored.id,
            sender = %stored.sender,
            recipient = %stored.recipient,
            message_type = %stored.message_type,
            context_id = ?stored.context_id,
            "Message sent"
        );

        Ok(stored)
    }

    /// Local shape checks, run before any I/O.
    pub fn validate(&self, draft: &NewMessage) -> Result<(), ValidationError> {
        if !self.config.is_agent(&draft.sender) {
            return Err(ValidationError::InvalidAgent {
                role: "sender",
                agent: draft.sender.clone(),
            });
        }

        if !self.config.is_recipient(&draft.recipient) {
            return Err(ValidationError::InvalidAgent {
                role: "recipient",
                agent: draft.recipient.clone(),
            });
        }

        let message_type = self
            .config
            .message_type(&draft.message_type)
            .ok_or_else(|| ValidationError::InvalidType(draft.message_type.clone()))?;

        if let Some(schema) = &message_type.payload {
            schema
                .check(&draft.payload)
                .map_err(|reason| ValidationError::InvalidPayload {
                    message_type: draft.message_type.clone(),
                    reason,
                })?;
        }

        draft.validate_fields()
    }

    /// Read messages addressed to `recipient`.
    ///
    /// With a `context_id` filter the read goes through the context index and
    /// keeps only rows for `recipient`, in creation order; otherwise it is a
    /// recipient query in the filter's order. Store order is never changed.
    pub async fn receive(
        &self,
        recipient: &str,
        filter: &ReceiveFilter,
    ) -> RelayResult<Vec<Message>> {
        self.ensure_recipient(recipient)?;

        match filter.context_id.as_deref() {
            Some(context_id) => {
                let messages = self
                    .store
                    .query_by_context(context_id)
                    .await?
                    .into_iter()
                    .filter(|m| m.recipient == recipient && filter.accepts(m))
                    .take(filter.effective_limit())
                    .collect();
                Ok(messages)
            }
            None => self.store.query_by_recipient(recipient, filter).await,
        }
    }

    /// Read several recipients' pending messages as one batch, oldest first.
    pub async fn receive_pending(
        &self,
        recipients: &[String],
        limit: usize,
    ) -> RelayResult<Vec<Message>> {
        let query = RecipientQuery::pending(limit);
        let mut batch = Vec::new();
        for recipient in recipients {
            batch.extend(self.receive(recipient, &query).await?);
        }

        // Stable: equal timestamps keep per-recipient store order
        batch.sort_by_key(|m| m.created_at);
        batch.truncate(query.effective_limit());
        Ok(batch)
    }

    /// Mark a message consumed by `by`. Safe to repeat.
    pub async fn acknowledge(&self, id: Uuid, by: &str) -> RelayResult<AckOutcome> {
        if !self.config.is_agent(by) {
            return Err(ValidationError::InvalidAgent {
                role: "acknowledger",
                agent: by.to_string(),
            }
            .into());
        }
        self.store.mark_acknowledged(id, by).await
    }

    /// Mark an acknowledged message as processed.
    pub async fn complete(&self, id: Uuid) -> RelayResult<Message> {
        self.store.mark_processed(id).await
    }

    pub async fn get(&self, id: Uuid) -> RelayResult<Option<Message>> {
        self.store.get(id).await
    }

    /// Cheap store read; never fails, reports the cause instead.
    pub async fn health_check(&self) -> HealthReport {
        let checked_at = Utc::now();
        match self.store.ping().await {
            Ok(()) => HealthReport {
                status: HealthStatus::Healthy,
                error: None,
                checked_at,
            },
            Err(e) => {
                debug!(error = %e, "Relay store health check failed");
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    error: Some(e.to_string()),
                    checked_at,
                }
            }
        }
    }

    pub async fn pending_stats(&self, recipient: Option<&str>) -> RelayResult<PendingStats> {
        self.store.pending_stats(recipient).await
    }

    /// Assemble one context's messages in creation order.
    pub async fn thread(&self, context_id: &str) -> RelayResult<ContextThread> {
        let messages = self.store.query_by_context(context_id).await?;
        Ok(ContextThread::assemble(context_id, messages))
    }

    /// Assemble a thread and judge it against the configured workflow rules.
    pub async fn validate_thread(&self, context_id: &str) -> RelayResult<WorkflowVerdict> {
        Ok(self.thread(context_id).await?.validate(&self.config.workflow))
    }

    fn ensure_recipient(&self, recipient: &str) -> Result<(), ValidationError> {
        if self.config.is_recipient(recipient) {
            Ok(())
        } else {
            Err(ValidationError::InvalidAgent {
                role: "recipient",
                agent: recipient.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMessageStore;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn client() -> RelayClient<InMemoryMessageStore> {
        let config = RelayConfig::from_toml_str(
            r#"
agents = ["A", "B"]
broadcast = "ALL"

[[message_types]]
name = "TASK_DELEGATION"
[message_types.payload]
required = { task = "string" }

[[message_types]]
name = "QUERY"
"#,
        )
        .unwrap();
        RelayClient::new(Arc::new(InMemoryMessageStore::new()), Arc::new(config))
    }

    #[tokio::test]
    async fn test_send_rejects_unknown_agents_before_io() {
        let client = client();

        let err = client
            .send("A", "C", "QUERY", Payload::new(), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = client
            .send("ALL", "A", "QUERY", Payload::new(), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(client.store().is_empty());
    }

    #[tokio::test]
    async fn test_send_rejects_unknown_type_and_bad_payload() {
        let client = client();

        let err = client
            .send("A", "B", "X", Payload::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::RelayError::Validation(ValidationError::InvalidType(_))
        ));

        let err = client
            .send("A", "B", "TASK_DELEGATION", payload(json!({ "task": 1 })), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::RelayError::Validation(ValidationError::InvalidPayload { .. })
        ));

        assert!(client.store().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_broadcast() {
        let client = client();
        let message = client
            .send("A", "ALL", "QUERY", Payload::new(), None)
            .await
            .unwrap();
        assert_eq!(message.recipient, "ALL");
    }

    #[tokio::test]
    async fn test_receive_by_context_keeps_recipient_rows() {
        let client = client();
        client
            .send("A", "B", "QUERY", Payload::new(), Some("ctx"))
            .await
            .unwrap();
        client
            .send("B", "A", "QUERY", Payload::new(), Some("ctx"))
            .await
            .unwrap();
        let last = client
            .send("A", "B", "QUERY", Payload::new(), Some("ctx"))
            .await
            .unwrap();

        let filter = ReceiveFilter {
            context_id: Some("ctx".to_string()),
            ..Default::default()
        };
        let received = client.receive("B", &filter).await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].id, last.id);

        let err = client.receive("C", &filter).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_acknowledge_requires_known_agent() {
        let client = client();
        let message = client
            .send("A", "B", "QUERY", Payload::new(), None)
            .await
            .unwrap();

        assert!(client.acknowledge(message.id, "ALL").await.is_err());
        let outcome = client.acknowledge(message.id, "B").await.unwrap();
        assert!(outcome.is_first());
    }

    #[tokio::test]
    async fn test_health_check_reports_cause() {
        let client = client();
        assert!(client.health_check().await.is_healthy());

        client.store().set_available(false);
        let report = client.health_check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.error.is_some());
    }
}
