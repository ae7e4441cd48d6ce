use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

// ============================================================================
// Domain Models
// ============================================================================

/// Money columns are `NUMERIC(12, 2)`: two decimal places, ten integer digits.
pub const MONEY_SCALE: u32 = 2;

/// Upper bound on an order's quantity. Together with `MAX_UNIT_PRICE` this
/// keeps every total inside the money column.
pub const MAX_QUANTITY: i32 = 1_000_000;

/// 9999.99
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(999_999, 0, 0, false, MONEY_SCALE);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: String,
    pub product_code: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Derived total for a line of `quantity` units at `price` each.
    pub fn total_for(quantity: i32, price: Decimal) -> Decimal {
        Decimal::from(quantity) * price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Row values for an insert; id and timestamps come from the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: String,
    pub product_code: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub customer_id: Option<String>,
    pub product_code: Option<String>,
    pub quantity: Option<i32>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.product_code.is_none() && self.quantity.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListFilter {
    pub limit: i64,
    pub offset: i64,
    pub status: Option<OrderStatus>,
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "customer_id must be 1-100 characters"))]
    pub customer_id: String,
    #[validate(length(min = 1, max = 200, message = "product_code must be 1-200 characters"))]
    pub product_code: String,
    #[validate(range(min = 1, max = 1000000, message = "quantity must be between 1 and 1000000"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "customer_id must be 1-100 characters"))]
    pub customer_id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "product_code must be 1-200 characters"))]
    pub product_code: Option<String>,
    #[validate(range(min = 1, max = 1000000, message = "quantity must be between 1 and 1000000"))]
    pub quantity: Option<i32>,
}

impl From<UpdateOrderRequest> for OrderPatch {
    fn from(req: UpdateOrderRequest) -> Self {
        Self {
            customer_id: req.customer_id,
            product_code: req.product_code,
            quantity: req.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderCreatedResponse {
    pub status: OrderStatus,
    pub id: i64,
}

/// Envelope shared by every JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Success with nothing to return but a note.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            data: None,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
