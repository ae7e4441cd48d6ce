use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    error::KafkaResult,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use super::{ChannelError, EventChannel, PublishOptions, Publishing};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker channel over the Kafka protocol (Redpanda). The exchange names
/// the topic and the routing key becomes the record key, so every
/// `order.created` event lands on one partition of `orders`.
pub struct RedpandaChannel {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaChannel {
    pub fn new(brokers: &str, metrics: Arc<Metrics>) -> KafkaResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(cb_config).on_transition(move |from, to| {
                metrics.record_circuit_breaker_transition(from, to);
            }),
        })
    }
}

#[async_trait]
impl EventChannel for RedpandaChannel {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: PublishOptions,
        message: Publishing,
    ) -> Result<(), ChannelError> {
        // Kafka has no mandatory/immediate delivery; both are accepted and
        // the record is written regardless of consumers.
        let _ = options;

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "content-type",
                value: Some(message.content_type.as_str()),
            })
            .insert(Header {
                key: "routing-key",
                value: Some(routing_key),
            });

        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(exchange)
                    .key(routing_key)
                    .payload(&message.body)
                    .headers(headers)
                    .timestamp(message.timestamp.timestamp_millis());

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| ChannelError::Send(e.to_string()))?;

                Ok::<(), ChannelError>(())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %exchange, key = %routing_key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    topic = %exchange,
                    "Circuit breaker open - Redpanda unavailable"
                );
                Err(ChannelError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    topic = %exchange,
                    "Failed to publish to Redpanda"
                );
                Err(e)
            }
        }
    }

    async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    async fn close(&self) {
        let producer = self.producer.clone();
        let flushed =
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
                .await;

        match flushed {
            Ok(Ok(())) => tracing::info!("Redpanda producer flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Redpanda producer flush incomplete"),
            Err(e) => tracing::warn!(error = %e, "Redpanda flush task failed"),
        }
    }
}
