// ============================================================================
// Messaging - Order events out to the broker
// ============================================================================
//
// - event.rs     - OrderCreatedEvent wire format
// - publisher.rs - EventPublisher: serialize + route an event
// - redpanda.rs  - Kafka-protocol channel with circuit breaker
// - memory.rs    - Recording channel for tests and local runs
//
// ============================================================================

mod event;
mod memory;
mod publisher;
mod redpanda;

pub use event::OrderCreatedEvent;
pub use memory::{InMemoryChannel, PublishedMessage};
pub use publisher::EventPublisher;
pub use redpanda::RedpandaChannel;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::utils::{CircuitState, IsTransient};

pub const ORDERS_EXCHANGE: &str = "orders";
pub const ORDER_CREATED_ROUTING_KEY: &str = "order.created";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Delivery flags for a publish. Mandatory asks the broker to return
/// unroutable messages; immediate asks it to reject when no consumer is
/// ready. Order events set neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub mandatory: bool,
    pub immediate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Publishing {
    pub content_type: String,
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("send failed: {0}")]
    Send(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to publish event: {0}")]
    Transport(#[from] ChannelError),
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        // A payload that failed to serialize will fail the same way again.
        matches!(self, PublishError::Transport(_))
    }
}

/// A live publish-capable handle to the broker.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: PublishOptions,
        message: Publishing,
    ) -> Result<(), ChannelError>;

    /// Breaker state for health reporting; channels without one stay closed.
    async fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }

    /// Flush in-flight messages before shutdown.
    async fn close(&self) {}
}
