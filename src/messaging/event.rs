use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Order, OrderStatus};
use crate::store::ORDER_CREATED;

/// Announces a newly persisted order. `created_at` is when the event was
/// published, not when the request arrived.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCreatedEvent {
    pub order_id: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub event_type: String,
}

impl OrderCreatedEvent {
    pub fn new(order_id: i64, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            created_at: Utc::now(),
            event_type: ORDER_CREATED.to_string(),
        }
    }

    pub fn for_order(order: &Order) -> Self {
        Self::new(order.id, order.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = OrderCreatedEvent::new(42, OrderStatus::Pending);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["order_id"], 42);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["event_type"], "order_created");
        assert!(json["created_at"].as_str().unwrap().contains('T'));
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_timestamp_is_server_side() {
        let before = Utc::now();
        let event = OrderCreatedEvent::new(1, OrderStatus::Pending);
        assert!(event.created_at >= before);
        assert!(event.created_at <= Utc::now());
    }
}
