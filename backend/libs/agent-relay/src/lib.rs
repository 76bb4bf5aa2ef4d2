//! # Agent Relay
//!
//! Store-and-forward messaging between a small, fixed set of autonomous
//! agents. Agents never talk to each other directly: every message is
//! persisted first and picked up later by the recipient's polling worker.
//!
//! ## How it works
//!
//! 1. A sender calls [`RelayClient::send`]; the message is validated locally
//!    (allow-listed identities, known type, payload schema) and appended to
//!    the [`MessageStore`] with status `SENT`
//! 2. Each agent runs a [`PollingWorker`] that periodically health-checks the
//!    store and fetches unacknowledged messages addressed to it
//! 3. The handler registered for the message type runs; on success the
//!    message is acknowledged (`SENT -> ACKNOWLEDGED`)
//! 4. A failed handler leaves the message `SENT`, so the next cycle
//!    delivers it again
//!
//! Messages sharing a `context_id` form a [`ContextThread`] that can be
//! reassembled in creation order and checked against workflow rules.
//!
//! ## Delivery guarantees
//!
//! - **At-least-once**: handlers may see the same message more than once and
//!   must be idempotent
//! - **Single acknowledgement**: concurrent acknowledgements of one message
//!   are resolved by the store; exactly one caller wins
//! - **Append-only**: messages are never edited or deleted, only their
//!   status moves forward
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use agent_relay::{
//!     handler_fn, HandlerRegistry, Payload, PgMessageStore, PollingWorker, RelayClient,
//!     RelayConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     agent_relay::telemetry::init_tracing(false)?;
//!
//!     let config = Arc::new(RelayConfig::load(None)?);
//!     let store = PgMessageStore::connect("postgresql://localhost/relay").await?;
//!     store.migrate().await?;
//!
//!     let client = RelayClient::new(Arc::new(store), config);
//!
//!     let mut task = Payload::new();
//!     task.insert("task".to_string(), "summarize report".into());
//!     client
//!         .send("coordinator", "worker", "TASK_DELEGATION", task, Some("job-42"))
//!         .await?;
//!
//!     let handlers = HandlerRegistry::new().register(
//!         "TASK_DELEGATION",
//!         handler_fn(|message| async move {
//!             tracing::info!(message_id = %message.id, "Got task");
//!             Ok::<_, anyhow::Error>(())
//!         }),
//!     );
//!
//!     let mut worker = PollingWorker::new(client.clone(), "worker", handlers)?;
//!     worker.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     worker.stop().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
mod error;
pub mod message;
pub mod metrics;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod thread;
pub mod worker;

pub use client::{HealthReport, HealthStatus, OutboundMessage, ReceiveFilter, RelayClient};
pub use config::{ConfigError, RelayConfig, WorkerConfig, WorkflowConfig};
pub use error::{DegradedStateError, HandlerError, RelayError, RelayResult, ValidationError};
pub use message::{AckOutcome, Message, MessageStatus, NewMessage, Payload};
pub use metrics::RelayMetrics;
pub use store::{
    InMemoryMessageStore, MessageStore, PendingStats, PgMessageStore, RecipientQuery, SortOrder,
};
pub use thread::{ContextThread, WorkflowPattern, WorkflowVerdict};
pub use worker::{
    handler_fn, CycleReport, CycleScheduler, CycleSummary, HandlerRegistry, IntervalScheduler,
    ManualScheduler, MessageHandler, PollingWorker, SkipReason, TickHandle, WorkerEvent,
    WorkerState, WorkerStatus,
};
