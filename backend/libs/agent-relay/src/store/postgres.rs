//! PostgreSQL-backed message store.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{MessageStore, PendingStats, RecipientQuery, SortOrder};
use crate::error::{RelayError, RelayResult};
use crate::message::{AckOutcome, Message, MessageStatus, NewMessage, Payload};

const COLUMNS: &str = r#"
    id,
    sender,
    recipient,
    message_type,
    payload,
    context_id,
    status,
    created_at,
    acknowledged_by,
    acknowledged_at
"#;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sender: String,
    recipient: String,
    message_type: String,
    payload: Json<Payload>,
    context_id: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    acknowledged_by: Option<String>,
    acknowledged_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RelayError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<MessageStatus>()
            .map_err(RelayError::Storage)?;

        Ok(Message {
            id: row.id,
            sender: row.sender,
            recipient: row.recipient,
            message_type: row.message_type,
            payload: row.payload.0,
            context_id: row.context_id,
            status,
            created_at: row.created_at,
            acknowledged_by: row.acknowledged_by,
            acknowledged_at: row.acknowledged_at,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> RelayResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

/// SQLx-based implementation of [`MessageStore`] over the `agent_messages`
/// table (see `migrations/001_create_agent_messages.sql`).
///
/// Ids are generated here; uniqueness is enforced by the primary key, and
/// `created_at` is taken from `clock_timestamp()` so rows written in the same
/// transaction still get distinct, ordered timestamps.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Create a new store with the given database pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> RelayResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to message database")?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> RelayResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run agent relay migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: NewMessage) -> RelayResult<Message> {
        message.validate_fields()?;

        let sql = format!(
            r#"
            INSERT INTO agent_messages (
                id,
                sender,
                recipient,
                message_type,
                payload,
                context_id,
                status
            ) VALUES ($1, $2, $3, $4, $5, $6, 'SENT')
            RETURNING {COLUMNS}
            "#
        );

        let row: MessageRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&message.sender)
            .bind(&message.recipient)
            .bind(&message.message_type)
            .bind(Json(&message.payload))
            .bind(&message.context_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert message")?;

        let stored = Message::try_from(row)?;

        debug!(
            message_id = %stored.id,
            message_type = %stored.message_type,
            recipient = %stored.recipient,
            "Message inserted"
        );

        Ok(stored)
    }

    async fn query_by_recipient(
        &self,
        recipient: &str,
        query: &RecipientQuery,
    ) -> RelayResult<Vec<Message>> {
        let direction = match query.order {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };

        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM agent_messages
            WHERE recipient = $1
              AND ($2::text IS NULL OR message_type = $2)
              AND ($3::text IS NULL OR context_id = $3)
              AND ($4::text IS NULL OR status = $4)
            ORDER BY created_at {direction}, seq {direction}
            LIMIT $5
            "#
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(recipient)
            .bind(&query.message_type)
            .bind(&query.context_id)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.effective_limit() as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch messages by recipient")?;

        debug!(recipient = %recipient, count = rows.len(), "Fetched messages by recipient");

        into_messages(rows)
    }

    async fn query_by_context(&self, context_id: &str) -> RelayResult<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM agent_messages
            WHERE context_id = $1
            ORDER BY created_at ASC, seq ASC
            "#
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(context_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch messages by context")?;

        into_messages(rows)
    }

    async fn get(&self, id: Uuid) -> RelayResult<Option<Message>> {
        let sql = format!("SELECT {COLUMNS} FROM agent_messages WHERE id = $1");

        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch message")?;

        row.map(Message::try_from).transpose()
    }

    async fn mark_acknowledged(&self, id: Uuid, by: &str) -> RelayResult<AckOutcome> {
        // Conditional update: only one caller can win the SENT -> ACKNOWLEDGED transition
        let sql = format!(
            r#"
            UPDATE agent_messages
            SET
                status = 'ACKNOWLEDGED',
                acknowledged_by = $2,
                acknowledged_at = clock_timestamp()
            WHERE id = $1 AND status = 'SENT'
            RETURNING {COLUMNS}
            "#
        );

        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(by)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to mark message as acknowledged")?;

        if let Some(row) = row {
            debug!(message_id = %id, acknowledged_by = %by, "Message acknowledged");
            return Ok(AckOutcome::Acknowledged(Message::try_from(row)?));
        }

        match self.get(id).await? {
            Some(existing) => {
                debug!(message_id = %id, status = %existing.status, "Message already acknowledged");
                Ok(AckOutcome::AlreadyAcknowledged(existing))
            }
            None => {
                warn!(message_id = %id, "Message not found when acknowledging");
                Err(RelayError::MessageNotFound(id))
            }
        }
    }

    async fn mark_processed(&self, id: Uuid) -> RelayResult<Message> {
        let sql = format!(
            r#"
            UPDATE agent_messages
            SET status = 'PROCESSED'
            WHERE id = $1 AND status = 'ACKNOWLEDGED'
            RETURNING {COLUMNS}
            "#
        );

        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to mark message as processed")?;

        if let Some(row) = row {
            debug!(message_id = %id, "Message processed");
            return Message::try_from(row);
        }

        match self.get(id).await? {
            Some(existing) if existing.status == MessageStatus::Processed => Ok(existing),
            Some(existing) => Err(RelayError::IllegalTransition {
                id,
                from: existing.status,
                to: MessageStatus::Processed,
            }),
            None => {
                warn!(message_id = %id, "Message not found when marking as processed");
                Err(RelayError::MessageNotFound(id))
            }
        }
    }

    async fn ping(&self) -> RelayResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn pending_stats(&self, recipient: Option<&str>) -> RelayResult<PendingStats> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                GREATEST(COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT, 0), 0) AS age_seconds
            FROM agent_messages
            WHERE status = 'SENT'
              AND ($1::text IS NULL OR recipient = $1)
            "#,
        )
        .bind(recipient)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute pending stats")?;

        Ok(PendingStats {
            pending: rec.try_get("pending")?,
            oldest_age_seconds: rec.try_get("age_seconds")?,
        })
    }
}
