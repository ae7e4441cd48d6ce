use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::messaging::{EventPublisher, OrderCreatedEvent, PublishError};
use crate::metrics::Metrics;
use crate::store::{OutboxEntry, OutboxStore, StoreError};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Outbox Relay
// ============================================================================
//
// Picks up creation events whose immediate publish failed and delivers them.
//
// - Only entries older than `grace_period` are considered, so the relay
//   does not race a request that is still publishing its own event
// - Each entry gets `retry.max_attempts` tries per pass with backoff
// - After `max_deliveries` failed passes the entry is dead-lettered
//
// Delivery is at-least-once: a crash between publish and mark_published
// republishes on the next pass.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub batch_size: i64,
    pub max_deliveries: i32,
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            grace_period: Duration::from_secs(30),
            batch_size: 50,
            max_deliveries: 5,
            retry: RetryConfig::default(),
        }
    }
}

/// Counters for one pass over the outbox.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    publisher: EventPublisher,
    config: RelayConfig,
    metrics: Arc<Metrics>,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: EventPublisher,
        config: RelayConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            outbox,
            publisher,
            config,
            metrics,
        }
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            grace_secs = self.config.grace_period.as_secs(),
            "🔄 Starting outbox relay"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.drain_once().await {
                        Ok(stats) if stats != RelayStats::default() => {
                            tracing::info!(
                                published = stats.published,
                                failed = stats.failed,
                                dead_lettered = stats.dead_lettered,
                                "📬 Outbox relay pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Failed to read outbox"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("🛑 Outbox relay stopped");
    }

    /// One pass over the pending entries that are past the grace period.
    pub async fn drain_once(&self) -> Result<RelayStats, StoreError> {
        let grace = chrono::Duration::from_std(self.config.grace_period)
            .unwrap_or(chrono::Duration::zero());
        let entries = self
            .outbox
            .pending(Utc::now() - grace, self.config.batch_size)
            .await?;

        let mut stats = RelayStats::default();
        for entry in entries {
            match self.deliver(&entry).await {
                RetryResult::Success(()) => {
                    self.outbox
                        .mark_published(entry.order_id, &entry.event_type)
                        .await?;
                    self.metrics.record_publish(&entry.event_type, "relay", true);
                    stats.published += 1;

                    tracing::info!(
                        order_id = entry.order_id,
                        event_type = %entry.event_type,
                        "✅ Relayed deferred event"
                    );
                }
                RetryResult::Failed(e) => {
                    self.metrics.record_publish(&entry.event_type, "relay", false);
                    if self.record_failure(entry, &e).await? {
                        stats.dead_lettered += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
                RetryResult::PermanentFailure(e) => {
                    self.metrics.record_publish(&entry.event_type, "relay", false);
                    self.send_to_dlq(entry, &e.to_string()).await?;
                    stats.dead_lettered += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn deliver(&self, entry: &OutboxEntry) -> RetryResult<(), PublishError> {
        let event = OrderCreatedEvent::new(entry.order_id, entry.status);
        let event = &event;
        let publisher = &self.publisher;
        let metrics = &self.metrics;

        retry_on_transient(&self.config.retry, move |attempt| {
            if attempt > 1 {
                metrics.relay_retry_attempts.inc();
            }
            publisher.publish(event)
        })
        .await
    }

    /// Returns true when the entry ran out of deliveries and was dead-lettered.
    async fn record_failure(
        &self,
        mut entry: OutboxEntry,
        error: &PublishError,
    ) -> Result<bool, StoreError> {
        let message = error.to_string();
        entry.attempts = self
            .outbox
            .record_failure(entry.order_id, &entry.event_type, &message)
            .await?;

        if entry.attempts < self.config.max_deliveries {
            tracing::warn!(
                order_id = entry.order_id,
                attempts = entry.attempts,
                max_deliveries = self.config.max_deliveries,
                error = %message,
                "Deferred event still undeliverable"
            );
            return Ok(false);
        }

        self.send_to_dlq(entry, &message).await?;
        Ok(true)
    }

    async fn send_to_dlq(&self, entry: OutboxEntry, error: &str) -> Result<(), StoreError> {
        self.outbox.dead_letter(&entry, error).await?;
        self.metrics.record_dlq_message(&entry.event_type);

        tracing::error!(
            order_id = entry.order_id,
            event_type = %entry.event_type,
            attempts = entry.attempts,
            error = %error,
            "💀 Event moved to dead letter queue"
        );
        Ok(())
    }
}
