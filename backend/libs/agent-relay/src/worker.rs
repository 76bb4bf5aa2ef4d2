//! Polling worker: push-like delivery for one agent identity.
//!
//! Each cycle:
//! 1. Health-check the store; an unhealthy store skips the cycle with no reads
//! 2. Fetch unacknowledged messages for the agent (and the broadcast identity), oldest first
//! 3. Invoke the handler registered for each message's type, one at a time
//! 4. Acknowledge on success; leave the message `SENT` on failure
//!
//! # Delivery Guarantees
//!
//! - **At-least-once**: a failed handler, a crash, or a restart means the
//!   message is delivered again on a later cycle. Handlers must be idempotent
//!   or tolerate duplicate delivery; the relay does not deduplicate for them.
//! - **Batch isolation**: one failing handler never stops the rest of the batch.
//! - **Ordering**: messages are handled in creation order, so a context's
//!   messages reach the handler in the order they were sent.
//! - **Broadcast**: every worker polls the broadcast identity, so the handlers
//!   of several workers may all run for the same broadcast message. Only one
//!   worker wins the acknowledgement; the others count a duplicate.
//!
//! There is no per-message timeout. A handler that never returns stalls this
//! worker; supervision belongs to the embedding application.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::RelayClient;
use crate::error::{DegradedStateError, HandlerError, RelayError, RelayResult, ValidationError};
use crate::message::{AckOutcome, Message};
use crate::metrics::RelayMetrics;
use crate::store::MessageStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Application-supplied processing for one message type.
///
/// Implementations must tolerate being called more than once for the same
/// message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

/// Wrap an async closure taking an owned [`Message`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        (self.0)(message.clone()).await
    }
}

/// Handlers keyed by message type, with an optional catch-all.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    fallback: Option<Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `message_type`, replacing any previous one.
    pub fn register(
        mut self,
        message_type: impl Into<String>,
        handler: impl MessageHandler + 'static,
    ) -> Self {
        self.handlers.insert(message_type.into(), Arc::new(handler));
        self
    }

    /// Handler for types without a dedicated registration.
    pub fn fallback(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn get(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .get(message_type)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn handles(&self, message_type: &str) -> bool {
        self.fallback.is_some() || self.handlers.contains_key(message_type)
    }
}

/// Source of cycle ticks for a running worker.
#[async_trait]
pub trait CycleScheduler: Send {
    /// Resolve when the next cycle should run.
    async fn next_tick(&mut self);
}

/// Fixed-period scheduler on the tokio timer.
///
/// The first tick fires immediately; missed ticks are delayed rather than
/// bursted.
pub struct IntervalScheduler {
    period: Duration,
    interval: Option<Interval>,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl CycleScheduler for IntervalScheduler {
    async fn next_tick(&mut self) {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

/// Scheduler driven by explicit [`TickHandle::tick`] calls.
pub struct ManualScheduler {
    ticks: mpsc::UnboundedReceiver<()>,
}

/// Sender side of a [`ManualScheduler`].
#[derive(Clone)]
pub struct TickHandle {
    ticks: mpsc::UnboundedSender<()>,
}

impl ManualScheduler {
    pub fn new() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { ticks: rx }, TickHandle { ticks: tx })
    }
}

impl TickHandle {
    /// Request one cycle. Returns `false` once the scheduler is gone.
    pub fn tick(&self) -> bool {
        self.ticks.send(()).is_ok()
    }
}

#[async_trait]
impl CycleScheduler for ManualScheduler {
    async fn next_tick(&mut self) {
        if self.ticks.recv().await.is_none() {
            // All handles dropped: never tick again, wait for shutdown
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Stopped,
    Running,
}

/// Counts from one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub fetched: usize,
    /// Handled and acknowledged by this worker
    pub delivered: usize,
    /// Handler failed or missing; left `SENT`
    pub failed: usize,
    /// Handled, but another consumer acknowledged first
    pub duplicates: usize,
    /// Handled, but the acknowledgement call itself failed
    pub ack_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Health check failed; nothing was read
    Unhealthy(String),
    /// Fetching the batch failed
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CycleReport {
    Completed(CycleSummary),
    Skipped(SkipReason),
}

impl CycleReport {
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            CycleReport::Completed(summary) => Some(summary),
            CycleReport::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleReport::Skipped(_))
    }
}

/// Observability events published by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started { agent: String },
    Stopped { agent: String },
    CycleStarted { agent: String, cycle: u64 },
    CycleCompleted { agent: String, summary: CycleSummary },
    CycleSkipped { agent: String, reason: SkipReason },
    HandlerFailed(HandlerError),
    /// Consecutive health failures reached the threshold (once per episode)
    Degraded(DegradedStateError),
    /// Health restored after a degraded episode
    Recovered { agent: String },
}

/// Snapshot returned by [`PollingWorker::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub agent: String,
    pub state: WorkerState,
    pub cycles_run: u64,
    pub consecutive_health_failures: u32,
    pub degraded: bool,
    /// Most recent failure seen by this worker
    pub last_error: Option<String>,
}

struct StatusInner {
    state: WorkerState,
    cycles_run: u64,
    consecutive_health_failures: u32,
    degraded: bool,
    last_error: Option<String>,
}

struct Shared<S: MessageStore> {
    client: RelayClient<S>,
    agent: String,
    recipients: Vec<String>,
    handlers: HandlerRegistry,
    batch_size: usize,
    degraded_threshold: u32,
    metrics: Option<RelayMetrics>,
    events: broadcast::Sender<WorkerEvent>,
    status: Mutex<StatusInner>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Box<dyn CycleScheduler>>,
}

/// Delivery loop for one agent identity.
///
/// State machine: `Stopped -> Running -> Stopped`. Several workers (one per
/// agent) may run side by side over the same store.
pub struct PollingWorker<S: MessageStore + 'static> {
    shared: Arc<Shared<S>>,
    scheduler: Option<Box<dyn CycleScheduler>>,
    poll_interval: Duration,
    running: Option<Running>,
}

impl<S: MessageStore + 'static> PollingWorker<S> {
    /// Create a stopped worker for `agent` using the client's worker config.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidAgent` if `agent` is not in the allow-list.
    pub fn new(
        client: RelayClient<S>,
        agent: impl Into<String>,
        handlers: HandlerRegistry,
    ) -> RelayResult<Self> {
        let agent = agent.into();
        let config = client.config();

        if !config.is_agent(&agent) {
            return Err(ValidationError::InvalidAgent {
                role: "worker",
                agent,
            }
            .into());
        }

        for message_type in &config.message_types {
            if !handlers.handles(&message_type.name) {
                debug!(
                    agent = %agent,
                    message_type = %message_type.name,
                    "No handler registered; messages of this type will stay unacknowledged"
                );
            }
        }

        let mut recipients = vec![agent.clone()];
        if let Some(broadcast) = &config.broadcast {
            recipients.push(broadcast.clone());
        }

        let poll_interval = config.poll_interval();
        let batch_size = config.worker.batch_size;
        let degraded_threshold = config.worker.degraded_threshold;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                client,
                agent,
                recipients,
                handlers,
                batch_size,
                degraded_threshold,
                metrics: None,
                events,
                status: Mutex::new(StatusInner {
                    state: WorkerState::Stopped,
                    cycles_run: 0,
                    consecutive_health_failures: 0,
                    degraded: false,
                    last_error: None,
                }),
            }),
            scheduler: None,
            poll_interval,
            running: None,
        })
    }

    /// Replace the default interval scheduler.
    pub fn with_scheduler(mut self, scheduler: impl CycleScheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Record delivery, failure and backlog metrics.
    ///
    /// Must be called before the worker is started or shared.
    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metrics = Some(metrics);
        } else {
            warn!(agent = %self.shared.agent, "Worker already shared, metrics not attached");
        }
        self
    }

    pub fn agent(&self) -> &str {
        &self.shared.agent
    }

    /// Identities polled each cycle: the agent, then the broadcast identity.
    pub fn recipients(&self) -> &[String] {
        &self.shared.recipients
    }

    pub fn state(&self) -> WorkerState {
        self.shared.status.lock().state
    }

    pub fn status(&self) -> WorkerStatus {
        let status = self.shared.status.lock();
        WorkerStatus {
            agent: self.shared.agent.clone(),
            state: status.state,
            cycles_run: status.cycles_run,
            consecutive_health_failures: status.consecutive_health_failures,
            degraded: status.degraded,
            last_error: status.last_error.clone(),
        }
    }

    /// Subscribe to worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.shared.events.subscribe()
    }

    /// Start the recurring cycle on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// `RelayError::WorkerState` if the worker is already running.
    pub fn start(&mut self) -> RelayResult<()> {
        if self.running.is_some() {
            return Err(RelayError::WorkerState(format!(
                "worker for {} is already running",
                self.shared.agent
            )));
        }

        let poll_interval = self.poll_interval;
        let scheduler = self.scheduler.take().unwrap_or_else(|| {
            Box::new(IntervalScheduler::new(poll_interval)) as Box<dyn CycleScheduler>
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();

        self.shared.status.lock().state = WorkerState::Running;

        let handle = tokio::spawn(run_loop(shared, scheduler, shutdown_rx));
        self.running = Some(Running { shutdown, handle });

        info!(
            agent = %self.shared.agent,
            recipients = ?self.shared.recipients,
            batch_size = self.shared.batch_size,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Polling worker started"
        );
        self.shared.emit(WorkerEvent::Started {
            agent: self.shared.agent.clone(),
        });

        Ok(())
    }

    /// Stop scheduling new cycles and wait for an in-flight cycle to finish.
    ///
    /// A handler in progress is never interrupted. Stopping a stopped worker
    /// is a no-op.
    pub async fn stop(&mut self) -> RelayResult<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // Receiver may already be gone if the loop exited on its own
        let _ = running.shutdown.send(true);

        match running.handle.await {
            Ok(scheduler) => self.scheduler = Some(scheduler),
            Err(e) => {
                error!(
                    agent = %self.shared.agent,
                    error = ?e,
                    "Polling worker task failed; scheduler lost, next start uses the interval scheduler"
                );
                self.shared
                    .record_error(format!("polling task failed, scheduler lost: {}", e));
            }
        }

        self.shared.status.lock().state = WorkerState::Stopped;

        info!(agent = %self.shared.agent, "Polling worker stopped");
        self.shared.emit(WorkerEvent::Stopped {
            agent: self.shared.agent.clone(),
        });

        Ok(())
    }

    /// Run a single cycle now, independent of the schedule.
    pub async fn run_cycle(&self) -> CycleReport {
        self.shared.run_cycle().await
    }
}

impl<S: MessageStore + 'static> Drop for PollingWorker<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            // Let the task finish its current cycle and exit on its own
            let _ = running.shutdown.send(true);
        }
    }
}

async fn run_loop<S: MessageStore + 'static>(
    shared: Arc<Shared<S>>,
    mut scheduler: Box<dyn CycleScheduler>,
    mut shutdown: watch::Receiver<bool>,
) -> Box<dyn CycleScheduler> {
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = scheduler.next_tick() => {}
        }

        if *shutdown.borrow() {
            break;
        }

        // Not raced against shutdown: an in-flight cycle always completes
        shared.run_cycle().await;
    }

    debug!(agent = %shared.agent, "Polling loop exited");
    scheduler
}

impl<S: MessageStore> Shared<S> {
    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn record_error(&self, error: String) {
        self.status.lock().last_error = Some(error);
    }

    async fn run_cycle(&self) -> CycleReport {
        let cycle = {
            let mut status = self.status.lock();
            status.cycles_run += 1;
            status.cycles_run
        };

        debug!(agent = %self.agent, cycle, "Cycle started");
        self.emit(WorkerEvent::CycleStarted {
            agent: self.agent.clone(),
            cycle,
        });

        let health = self.client.health_check().await;
        if !health.is_healthy() {
            let cause = health
                .error
                .unwrap_or_else(|| "unknown health check failure".to_string());
            return self.skip_unhealthy(cause);
        }
        self.mark_healthy();

        let batch = match self
            .client
            .receive_pending(&self.recipients, self.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(agent = %self.agent, error = ?e, "Failed to fetch pending messages, skipping cycle");
                let reason = SkipReason::Storage(e.to_string());
                self.record_error(format!("receive failed: {}", e));
                self.emit(WorkerEvent::CycleSkipped {
                    agent: self.agent.clone(),
                    reason: reason.clone(),
                });
                return CycleReport::Skipped(reason);
            }
        };

        let mut summary = CycleSummary {
            fetched: batch.len(),
            ..Default::default()
        };

        for message in batch {
            self.deliver(message, &mut summary).await;
        }

        if let Some(metrics) = &self.metrics {
            match self.client.pending_stats(Some(&self.agent)).await {
                Ok(stats) => metrics.record_pending(stats),
                Err(e) => debug!(agent = %self.agent, error = %e, "Failed to refresh pending stats"),
            }
        }

        if summary.delivered > 0 {
            info!(
                agent = %self.agent,
                delivered = summary.delivered,
                failed = summary.failed,
                "Delivered messages"
            );
        } else {
            debug!(agent = %self.agent, fetched = summary.fetched, "No messages delivered");
        }

        self.emit(WorkerEvent::CycleCompleted {
            agent: self.agent.clone(),
            summary,
        });

        CycleReport::Completed(summary)
    }

    fn skip_unhealthy(&self, cause: String) -> CycleReport {
        let (failures, newly_degraded) = {
            let mut status = self.status.lock();
            status.consecutive_health_failures += 1;
            status.last_error = Some(format!("health check failed: {}", cause));
            let newly_degraded =
                !status.degraded && status.consecutive_health_failures >= self.degraded_threshold;
            if newly_degraded {
                status.degraded = true;
            }
            (status.consecutive_health_failures, newly_degraded)
        };

        if let Some(metrics) = &self.metrics {
            metrics.health_check_failures.inc();
        }

        warn!(
            agent = %self.agent,
            consecutive_failures = failures,
            error = %cause,
            "Store unhealthy, skipping cycle"
        );

        if newly_degraded {
            let degraded = DegradedStateError {
                agent: self.agent.clone(),
                consecutive_failures: failures,
                last_error: cause.clone(),
            };
            error!(
                agent = %self.agent,
                consecutive_failures = failures,
                threshold = self.degraded_threshold,
                "Polling worker degraded"
            );
            self.emit(WorkerEvent::Degraded(degraded));
        }

        let reason = SkipReason::Unhealthy(cause);
        self.emit(WorkerEvent::CycleSkipped {
            agent: self.agent.clone(),
            reason: reason.clone(),
        });
        CycleReport::Skipped(reason)
    }

    fn mark_healthy(&self) {
        let recovered = {
            let mut status = self.status.lock();
            status.consecutive_health_failures = 0;
            std::mem::replace(&mut status.degraded, false)
        };

        if recovered {
            info!(agent = %self.agent, "Store healthy again, worker recovered");
            self.emit(WorkerEvent::Recovered {
                agent: self.agent.clone(),
            });
        }
    }

    async fn deliver(&self, message: Message, summary: &mut CycleSummary) {
        let Some(handler) = self.handlers.get(&message.message_type) else {
            self.record_handler_failure(
                message.id,
                message.message_type,
                "no handler registered".to_string(),
                summary,
            );
            return;
        };

        let id = message.id;
        let message_type = message.message_type.clone();

        // Run on its own task so a panicking handler is contained like an error
        let outcome = tokio::spawn(async move { handler.handle(&message).await }).await;

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(join_err) => Err(format!("handler panicked: {}", join_err)),
        };

        if let Err(reason) = result {
            self.record_handler_failure(id, message_type, reason, summary);
            return;
        }

        match self.client.acknowledge(id, &self.agent).await {
            Ok(AckOutcome::Acknowledged(_)) => {
                summary.delivered += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.delivered.inc();
                }
                debug!(agent = %self.agent, message_id = %id, message_type = %message_type, "Message delivered");
            }
            Ok(AckOutcome::AlreadyAcknowledged(existing)) => {
                summary.duplicates += 1;
                debug!(
                    agent = %self.agent,
                    message_id = %id,
                    acknowledged_by = ?existing.acknowledged_by,
                    "Message already acknowledged by another consumer"
                );
            }
            Err(e) => {
                summary.ack_failures += 1;
                error!(
                    agent = %self.agent,
                    message_id = %id,
                    error = ?e,
                    "Failed to acknowledge message (handler already ran, it will be redelivered)"
                );
                self.record_error(format!("acknowledge {} failed: {}", id, e));
            }
        }
    }

    fn record_handler_failure(
        &self,
        message_id: Uuid,
        message_type: String,
        reason: String,
        summary: &mut CycleSummary,
    ) {
        summary.failed += 1;
        if let Some(metrics) = &self.metrics {
            metrics.handler_failures.inc();
        }

        let failure = HandlerError {
            message_id,
            message_type,
            reason,
        };

        warn!(
            agent = %self.agent,
            message_id = %failure.message_id,
            message_type = %failure.message_type,
            error = %failure.reason,
            "Handler failed, message left unacknowledged"
        );

        self.record_error(failure.to_string());
        self.emit(WorkerEvent::HandlerFailed(failure));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl MessageHandler for Noop {
        async fn handle(&self, _message: &Message) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup_and_fallback() {
        let registry = HandlerRegistry::new().register("QUERY", Noop);
        assert!(registry.get("QUERY").is_some());
        assert!(registry.get("ERROR").is_none());
        assert!(!registry.handles("ERROR"));

        let registry = registry.fallback(Noop);
        assert!(registry.get("ERROR").is_some());
        assert!(registry.handles("ERROR"));
    }

    #[tokio::test]
    async fn test_manual_scheduler_ticks_on_demand() {
        let (mut scheduler, handle) = ManualScheduler::new();
        assert!(handle.tick());
        assert!(handle.tick());

        scheduler.next_tick().await;
        scheduler.next_tick().await;

        let pending = tokio::time::timeout(Duration::from_millis(20), scheduler.next_tick()).await;
        assert!(pending.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_scheduler_first_tick_is_immediate() {
        let mut scheduler = IntervalScheduler::new(Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        scheduler.next_tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        scheduler.next_tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    struct PanickingScheduler;

    #[async_trait]
    impl CycleScheduler for PanickingScheduler {
        async fn next_tick(&mut self) {
            panic!("scheduler bug");
        }
    }

    #[tokio::test]
    async fn test_stop_after_loop_panic_reports_lost_scheduler() {
        use crate::config::RelayConfig;
        use crate::store::InMemoryMessageStore;

        let config = RelayConfig::new(["A"], ["QUERY"]).unwrap();
        let client = RelayClient::new(Arc::new(InMemoryMessageStore::new()), Arc::new(config));
        let mut worker = PollingWorker::new(client, "A", HandlerRegistry::new())
            .unwrap()
            .with_scheduler(PanickingScheduler);

        worker.start().unwrap();
        while !worker.running.as_ref().unwrap().handle.is_finished() {
            tokio::task::yield_now().await;
        }

        worker.stop().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.scheduler.is_none());
        assert!(worker
            .status()
            .last_error
            .unwrap()
            .contains("scheduler lost"));

        // Restart falls back to the interval scheduler
        worker.start().unwrap();
        worker.stop().await.unwrap();
        assert!(worker.scheduler.is_some());
    }

    #[test]
    fn test_cycle_report_helpers() {
        let done = CycleReport::Completed(CycleSummary {
            fetched: 2,
            delivered: 2,
            ..Default::default()
        });
        assert_eq!(done.summary().map(|s| s.delivered), Some(2));
        assert!(!done.is_skipped());

        let skipped = CycleReport::Skipped(SkipReason::Unhealthy("down".to_string()));
        assert!(skipped.summary().is_none());
        assert!(skipped.is_skipped());
    }
}
