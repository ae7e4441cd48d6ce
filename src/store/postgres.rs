use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{DeadLetter, OrderStore, OutboxEntry, OutboxStore, StoreError, ORDER_CREATED};
use crate::models::{ListFilter, NewOrder, Order, OrderPatch, OrderStatus};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================

const ORDER_COLUMNS: &str =
    "id, customer_id, product_code, quantity, price, total_amount, status, created_at, updated_at";

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        customer_id VARCHAR(100) NOT NULL CHECK (customer_id <> ''),
        product_code VARCHAR(200) NOT NULL CHECK (product_code <> ''),
        quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 1),
        price NUMERIC(12, 2) NOT NULL CHECK (price >= 0),
        total_amount NUMERIC(12, 2) NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'shipped', 'delivered', 'cancelled')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders (created_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status)",
    r#"CREATE OR REPLACE FUNCTION update_updated_at_column()
    RETURNS TRIGGER AS $$
    BEGIN
        NEW.updated_at = NOW();
        RETURN NEW;
    END;
    $$ LANGUAGE plpgsql"#,
    "DROP TRIGGER IF EXISTS update_orders_updated_at ON orders",
    r#"CREATE TRIGGER update_orders_updated_at
        BEFORE UPDATE ON orders
        FOR EACH ROW
        EXECUTE FUNCTION update_updated_at_column()"#,
    r#"CREATE TABLE IF NOT EXISTS order_outbox (
        order_id BIGINT NOT NULL,
        event_type VARCHAR(50) NOT NULL,
        status VARCHAR(20) NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (order_id, event_type)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_order_outbox_created_at ON order_outbox (created_at)",
    r#"CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL,
        event_type VARCHAR(50) NOT NULL,
        status VARCHAR(20) NOT NULL,
        error_message TEXT NOT NULL,
        failure_count INTEGER NOT NULL,
        first_failed_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
];

/// Apply the schema. Every statement is idempotent, so this runs on each boot.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(statements = MIGRATIONS.len(), "✅ Database migrations applied");
    Ok(())
}

#[derive(Clone, Debug)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    raw.parse::<OrderStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status")?;

    Ok(Order {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        product_code: row.try_get("product_code")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        total_amount: row.try_get("total_amount")?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxEntry, StoreError> {
    let status: String = row.try_get("status")?;

    Ok(OutboxEntry {
        order_id: row.try_get("order_id")?,
        event_type: row.try_get("event_type")?,
        status: parse_status(&status)?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO orders (customer_id, product_code, quantity, price, total_amount, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.customer_id)
        .bind(&order.product_code)
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let created = order_from_row(&row)?;

        sqlx::query(
            "INSERT INTO order_outbox (order_id, event_type, status, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(created.id)
        .bind(ORDER_CREATED)
        .bind(created.status.as_str())
        .bind(created.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(order_id = created.id, "Inserted order with outbox entry");
        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn update(&self, id: i64, patch: OrderPatch) -> Result<Option<Order>, StoreError> {
        // Total is derived in the same statement so a concurrent quantity
        // change can never leave it stale.
        let row = sqlx::query(&format!(
            "UPDATE orders
             SET customer_id = COALESCE($1, customer_id),
                 product_code = COALESCE($2, product_code),
                 quantity = COALESCE($3, quantity),
                 total_amount = COALESCE($3, quantity) * price
             WHERE id = $4
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(patch.customer_id)
        .bind(patch.product_code)
        .bind(patch.quantity)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $1 WHERE id = $2 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgOrderStore {
    async fn pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT order_id, event_type, status, attempts, last_error, created_at
             FROM order_outbox
             WHERE created_at <= $1
             ORDER BY created_at ASC, order_id ASC
             LIMIT $2",
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_published(&self, order_id: i64, event_type: &str) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM order_outbox WHERE order_id = $1 AND event_type = $2",
        )
        .bind(order_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(
        &self,
        order_id: i64,
        event_type: &str,
        error: &str,
    ) -> Result<i32, StoreError> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE order_outbox SET attempts = attempts + 1, last_error = $3
             WHERE order_id = $1 AND event_type = $2
             RETURNING attempts",
        )
        .bind(order_id)
        .bind(event_type)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts.unwrap_or(0))
    }

    async fn dead_letter(&self, entry: &OutboxEntry, error: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO dead_letter_queue
                (order_id, event_type, status, error_message, failure_count, first_failed_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.order_id)
        .bind(&entry.event_type)
        .bind(entry.status.as_str())
        .bind(error)
        .bind(entry.attempts)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_outbox WHERE order_id = $1 AND event_type = $2")
            .bind(entry.order_id)
            .bind(&entry.event_type)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::error!(
            order_id = entry.order_id,
            event_type = %entry.event_type,
            failure_count = entry.attempts,
            error = %error,
            "💀 Moved outbox entry to dead letter queue"
        );

        Ok(())
    }

    async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, order_id, event_type, status, error_message, failure_count,
                    first_failed_at, created_at
             FROM dead_letter_queue
             ORDER BY created_at DESC, id DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DeadLetter, StoreError> {
                let status: String = row.try_get("status")?;
                Ok(DeadLetter {
                    id: row.try_get("id")?,
                    order_id: row.try_get("order_id")?,
                    event_type: row.try_get("event_type")?,
                    status: parse_status(&status)?,
                    error_message: row.try_get("error_message")?,
                    failure_count: row.try_get("failure_count")?,
                    first_failed_at: row.try_get("first_failed_at")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_cover_schema() {
        let ddl = MIGRATIONS.join("\n");
        for table in ["orders", "order_outbox", "dead_letter_queue"] {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
        for column in ORDER_COLUMNS.split(", ") {
            assert!(ddl.contains(column), "missing column {column}");
        }
        assert!(ddl.contains("BEFORE UPDATE ON orders"));
    }

    #[test]
    fn test_status_check_matches_enum() {
        let ddl = MIGRATIONS[0];
        for status in OrderStatus::ALL {
            assert!(ddl.contains(&format!("'{}'", status.as_str())));
        }
    }

    #[test]
    fn test_corrupt_status_is_typed() {
        assert!(matches!(parse_status("archived"), Err(StoreError::Corrupt(_))));
    }
}
