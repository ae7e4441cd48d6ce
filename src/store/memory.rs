use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{DeadLetter, OrderStore, OutboxEntry, OutboxStore, StoreError, ORDER_CREATED};
use crate::models::{ListFilter, NewOrder, Order, OrderPatch, OrderStatus};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Same contract as `PgOrderStore`, held behind one async mutex. Used for
// local runs without Postgres and as the store behind the test suite.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    next_order_id: i64,
    next_dead_letter_id: i64,
    orders: BTreeMap<i64, Order>,
    outbox: BTreeMap<(i64, String), OutboxEntry>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the undelivered outbox entries.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.tables.lock().await.outbox.values().cloned().collect()
    }

    /// Backdate an outbox entry so the relay's grace period has elapsed.
    pub async fn age_outbox_entry(&self, order_id: i64, created_at: DateTime<Utc>) {
        let mut tables = self.tables.lock().await;
        if let Some(entry) = tables.outbox.get_mut(&(order_id, ORDER_CREATED.to_string())) {
            entry.created_at = created_at;
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

/// Timestamp for a mutation; never earlier than the previous one so
/// `created_at <= updated_at` holds even if the wall clock steps back.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        tables.next_order_id += 1;
        let now = Utc::now();
        let created = Order {
            id: tables.next_order_id,
            customer_id: order.customer_id,
            product_code: order.product_code,
            quantity: order.quantity,
            price: order.price,
            total_amount: order.total_amount,
            status: order.status,
            created_at: now,
            updated_at: now,
        };

        tables.orders.insert(created.id, created.clone());
        tables.outbox.insert(
            (created.id, ORDER_CREATED.to_string()),
            OutboxEntry {
                order_id: created.id,
                event_type: ORDER_CREATED.to_string(),
                status: created.status,
                attempts: 0,
                last_error: None,
                created_at: now,
            },
        );

        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Order>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;

        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| filter.status.is_none_or(|status| order.status == status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn update(&self, id: i64, patch: OrderPatch) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(customer_id) = patch.customer_id {
            order.customer_id = customer_id;
        }
        if let Some(product_code) = patch.product_code {
            order.product_code = product_code;
        }
        if let Some(quantity) = patch.quantity {
            order.quantity = quantity;
        }
        order.total_amount = Order::total_for(order.quantity, order.price);
        order.updated_at = touch(order.updated_at);

        Ok(Some(order.clone()))
    }

    async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        Ok(tables.orders.get_mut(&id).map(|order| {
            order.status = status;
            order.updated_at = touch(order.updated_at);
            order.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.orders.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderStore {
    async fn pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;

        let mut entries: Vec<OutboxEntry> = tables
            .outbox
            .values()
            .filter(|entry| entry.created_at <= older_than)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.order_id.cmp(&b.order_id)));
        entries.truncate(limit.max(0) as usize);

        Ok(entries)
    }

    async fn mark_published(&self, order_id: i64, event_type: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.tables
            .lock()
            .await
            .outbox
            .remove(&(order_id, event_type.to_string()));
        Ok(())
    }

    async fn record_failure(
        &self,
        order_id: i64,
        event_type: &str,
        error: &str,
    ) -> Result<i32, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        Ok(match tables.outbox.get_mut(&(order_id, event_type.to_string())) {
            Some(entry) => {
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
                entry.attempts
            }
            None => 0,
        })
    }

    async fn dead_letter(&self, entry: &OutboxEntry, error: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        tables.next_dead_letter_id += 1;
        let id = tables.next_dead_letter_id;
        tables.dead_letters.push(DeadLetter {
            id,
            order_id: entry.order_id,
            event_type: entry.event_type.clone(),
            status: entry.status,
            error_message: error.to_string(),
            failure_count: entry.attempts,
            first_failed_at: entry.created_at,
            created_at: Utc::now(),
        });
        tables.outbox.remove(&(entry.order_id, entry.event_type.clone()));

        Ok(())
    }

    async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;

        Ok(tables
            .dead_letters
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
