use std::sync::Arc;

use super::{
    EventChannel, OrderCreatedEvent, PublishError, PublishOptions, Publishing,
    JSON_CONTENT_TYPE, ORDERS_EXCHANGE, ORDER_CREATED_ROUTING_KEY,
};
use crate::models::Order;

// ============================================================================
// Event Publisher
// ============================================================================
//
// Turns an order state change into a broker message. No retries here: a
// failure goes straight back to the caller, and redelivery is the outbox
// relay's job.
//
// ============================================================================

#[derive(Clone)]
pub struct EventPublisher {
    channel: Arc<dyn EventChannel>,
}

impl EventPublisher {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<dyn EventChannel> {
        &self.channel
    }

    pub async fn publish_order_created(
        &self,
        order: &Order,
    ) -> Result<OrderCreatedEvent, PublishError> {
        let event = OrderCreatedEvent::for_order(order);
        self.publish(&event).await?;
        Ok(event)
    }

    pub async fn publish(&self, event: &OrderCreatedEvent) -> Result<(), PublishError> {
        let body = serde_json::to_vec(event)?;

        self.channel
            .publish(
                ORDERS_EXCHANGE,
                ORDER_CREATED_ROUTING_KEY,
                PublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                Publishing {
                    content_type: JSON_CONTENT_TYPE.to_string(),
                    body,
                    timestamp: event.created_at,
                },
            )
            .await?;

        tracing::info!(
            order_id = event.order_id,
            event_type = %event.event_type,
            exchange = ORDERS_EXCHANGE,
            routing_key = ORDER_CREATED_ROUTING_KEY,
            "📤 Published order event"
        );

        Ok(())
    }
}
