// ============================================================================
// Order Store - Relational persistence for orders and their outbox
// ============================================================================
//
// `OrderStore` is the CRUD surface over the `orders` table. `OutboxStore`
// exposes the `order_outbox` and `dead_letter_queue` tables to the relay.
//
// Both traits are object safe so the service and relay can hold
// `Arc<dyn ...>` and swap the Postgres backend for the in-memory one.
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::{run_migrations, PgOrderStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ListFilter, NewOrder, Order, OrderPatch, OrderStatus};

pub const ORDER_CREATED: &str = "order_created";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order and its `order_created` outbox entry atomically.
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn find(&self, id: i64) -> Result<Option<Order>, StoreError>;

    async fn list(&self, filter: ListFilter) -> Result<Vec<Order>, StoreError>;

    /// Merge `patch` into the row and recompute `total_amount` from the
    /// resulting quantity and the stored price. `None` if the row is gone.
    async fn update(&self, id: i64, patch: OrderPatch) -> Result<Option<Order>, StoreError>;

    async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<Option<Order>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

// ============================================================================
// Outbox
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxEntry {
    pub order_id: i64,
    pub event_type: String,
    pub status: OrderStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub id: i64,
    pub order_id: i64,
    pub event_type: String,
    pub status: OrderStatus,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Entries created at or before `older_than`, oldest first.
    async fn pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Delivered entries are removed; the outbox only holds undelivered work.
    async fn mark_published(&self, order_id: i64, event_type: &str) -> Result<(), StoreError>;

    /// Bumps the attempt counter and returns its new value.
    async fn record_failure(
        &self,
        order_id: i64,
        event_type: &str,
        error: &str,
    ) -> Result<i32, StoreError>;

    /// Moves the entry out of the outbox into the dead letter queue.
    async fn dead_letter(&self, entry: &OutboxEntry, error: &str) -> Result<(), StoreError>;

    async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError>;
}
