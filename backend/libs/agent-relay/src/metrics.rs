use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

use crate::store::PendingStats;

#[derive(Clone)]
pub struct RelayMetrics {
    pub sent: IntCounter,
    pub delivered: IntCounter,
    pub handler_failures: IntCounter,
    pub health_check_failures: IntCounter,
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
}

impl RelayMetrics {
    pub fn new(agent: &str) -> Self {
        let registry = prometheus::default_registry();

        let sent = IntCounter::with_opts(
            Opts::new(
                "relay_messages_sent_total",
                "Total number of messages appended through the relay client",
            )
            .const_label("agent", agent.to_string()),
        )
        .expect("valid metric opts for relay_messages_sent_total");

        let delivered = IntCounter::with_opts(
            Opts::new(
                "relay_messages_delivered_total",
                "Total number of messages handled and acknowledged by a worker",
            )
            .const_label("agent", agent.to_string()),
        )
        .expect("valid metric opts for relay_messages_delivered_total");

        let handler_failures = IntCounter::with_opts(
            Opts::new(
                "relay_handler_failures_total",
                "Total number of handler invocations that failed and left the message unacknowledged",
            )
            .const_label("agent", agent.to_string()),
        )
        .expect("valid metric opts for relay_handler_failures_total");

        let health_check_failures = IntCounter::with_opts(
            Opts::new(
                "relay_health_check_failures_total",
                "Total number of worker cycles skipped because the store was unhealthy",
            )
            .const_label("agent", agent.to_string()),
        )
        .expect("valid metric opts for relay_health_check_failures_total");

        let pending = IntGauge::with_opts(
            Opts::new(
                "relay_pending_messages",
                "Number of unacknowledged messages addressed to the agent",
            )
            .const_label("agent", agent.to_string()),
        )
        .expect("valid metric opts for relay_pending_messages");

        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new(
                "relay_oldest_pending_age_seconds",
                "Age in seconds of the oldest unacknowledged message addressed to the agent",
            )
            .const_label("agent", agent.to_string()),
        )
        .expect("valid metric opts for relay_oldest_pending_age_seconds");

        for metric in [
            Box::new(sent.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(delivered.clone()),
            Box::new(handler_failures.clone()),
            Box::new(health_check_failures.clone()),
            Box::new(pending.clone()),
            Box::new(oldest_pending_age_seconds.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register relay metric: {}", e);
            }
        }

        Self {
            sent,
            delivered,
            handler_failures,
            health_check_failures,
            pending,
            oldest_pending_age_seconds,
        }
    }

    pub fn record_pending(&self, stats: PendingStats) {
        self.pending.set(stats.pending);
        self.oldest_pending_age_seconds.set(stats.oldest_age_seconds);
    }
}
