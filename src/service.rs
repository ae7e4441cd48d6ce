use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::OrderError;
use crate::metrics::Metrics;
use crate::models::{
    CreateOrderRequest, ListFilter, NewOrder, Order, OrderPatch, OrderStatus, MAX_QUANTITY,
};
use crate::pricing::{check_unit_price, PriceSource};
use crate::store::OrderStore;

// ============================================================================
// Order Lifecycle Service
// ============================================================================
//
// Stateless business logic over an `OrderStore`. Store failures are never
// recovered here; they surface as `OrderError::Persistence`.
//
// ============================================================================

pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    pricing: Arc<dyn PriceSource>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        pricing: Arc<dyn PriceSource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            pricing,
            metrics,
        }
    }

    /// Price the request and persist it as a `pending` order.
    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
        self.observe("create", async {
            check_quantity(request.quantity)?;
            let price = check_unit_price(self.pricing.unit_price(&request.product_code).await?)?;
            let new_order = NewOrder {
                total_amount: Order::total_for(request.quantity, price),
                customer_id: request.customer_id,
                product_code: request.product_code,
                quantity: request.quantity,
                price,
                status: OrderStatus::Pending,
            };

            let order = self.store.insert(new_order).await?;

            tracing::info!(
                order_id = order.id,
                customer_id = %order.customer_id,
                product_code = %order.product_code,
                quantity = order.quantity,
                total_amount = %order.total_amount,
                "Created order"
            );
            Ok::<_, OrderError>(order)
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Order, OrderError> {
        self.observe("get", self.find(id)).await
    }

    /// Newest first. A zero limit falls back to the default page size.
    pub async fn list(
        &self,
        limit: u32,
        offset: u32,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrderError> {
        self.observe("list", async {
            let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { i64::from(limit) };
            let orders = self
                .store
                .list(ListFilter {
                    limit,
                    offset: i64::from(offset),
                    status,
                })
                .await?;
            Ok::<_, OrderError>(orders)
        })
        .await
    }

    /// Merge `patch` into an existing order. Price is not patchable; the
    /// total is recomputed from the resulting quantity and the stored price.
    pub async fn update(&self, id: i64, patch: OrderPatch) -> Result<Order, OrderError> {
        self.observe("update", async {
            validate_patch(&patch)?;
            let existing = self.find(id).await?;

            if patch.is_empty() {
                return Ok(existing);
            }

            let order = self
                .store
                .update(id, patch)
                .await?
                .ok_or(OrderError::NotFound(id))?;

            tracing::info!(
                order_id = id,
                quantity = order.quantity,
                total_amount = %order.total_amount,
                "Updated order"
            );
            Ok::<_, OrderError>(order)
        })
        .await
    }

    pub async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order, OrderError> {
        self.observe("update_status", self.transition(id, status)).await
    }

    /// Status transition from an unchecked string, e.g. a raw request field.
    pub async fn update_status_str(&self, id: i64, status: &str) -> Result<Order, OrderError> {
        self.observe("update_status", async {
            let status = status
                .parse::<OrderStatus>()
                .map_err(|e| OrderError::Validation(e.to_string()))?;
            self.transition(id, status).await
        })
        .await
    }

    async fn transition(&self, id: i64, status: OrderStatus) -> Result<Order, OrderError> {
        let existing = self.find(id).await?;

        let order = self
            .store
            .update_status(id, status)
            .await?
            .ok_or(OrderError::NotFound(id))?;

        tracing::info!(
            order_id = id,
            from = %existing.status,
            to = %order.status,
            "Order status changed"
        );
        Ok(order)
    }

    pub async fn delete(&self, id: i64) -> Result<(), OrderError> {
        self.observe("delete", async {
            if !self.store.delete(id).await? {
                return Err(OrderError::NotFound(id));
            }
            tracing::info!(order_id = id, "Deleted order");
            Ok::<_, OrderError>(())
        })
        .await
    }

    async fn find(&self, id: i64) -> Result<Order, OrderError> {
        self.store.find(id).await?.ok_or(OrderError::NotFound(id))
    }

    async fn observe<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, OrderError>>,
    ) -> Result<T, OrderError> {
        let started = Instant::now();
        let result = fut.await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(OrderError::NotFound(_)) => "not_found",
            Err(OrderError::Validation(_)) => "invalid",
            Err(e) => {
                tracing::error!(operation, error = %e, "Order operation failed");
                "error"
            }
        };
        self.metrics
            .record_operation(operation, outcome, started.elapsed().as_secs_f64());

        result
    }
}

fn validate_patch(patch: &OrderPatch) -> Result<(), OrderError> {
    if patch.customer_id.as_deref().is_some_and(str::is_empty) {
        return Err(OrderError::Validation("customer_id must not be empty".into()));
    }
    if patch.product_code.as_deref().is_some_and(str::is_empty) {
        return Err(OrderError::Validation("product_code must not be empty".into()));
    }
    if let Some(quantity) = patch.quantity {
        check_quantity(quantity)?;
    }
    Ok(())
}

fn check_quantity(quantity: i32) -> Result<(), OrderError> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(OrderError::Validation(format!(
            "quantity must be between 1 and {MAX_QUANTITY}, got {quantity}"
        )));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
