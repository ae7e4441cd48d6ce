use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{MAX_UNIT_PRICE, MONEY_SCALE};

// ============================================================================
// Pricing
// ============================================================================
//
// Unit prices come from a `PriceSource`. There is no catalog lookup yet, so
// the service runs with `FixedPrice`, one rate for every product code.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("unit price {0} is not a storable amount (0 to 9999.99, at most two decimals)")]
    InvalidPrice(Decimal),
}

/// Accept a unit price only if the money column stores it exactly, so
/// `total_amount == quantity * price` still holds after the round trip.
pub fn check_unit_price(price: Decimal) -> Result<Decimal, PricingError> {
    if price < Decimal::ZERO || price > MAX_UNIT_PRICE || price.normalize().scale() > MONEY_SCALE {
        return Err(PricingError::InvalidPrice(price));
    }
    Ok(price)
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn unit_price(&self, product_code: &str) -> Result<Decimal, PricingError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPrice {
    unit_price: Decimal,
}

impl FixedPrice {
    pub fn new(unit_price: Decimal) -> Self {
        Self { unit_price }
    }
}

impl Default for FixedPrice {
    fn default() -> Self {
        Self::new(Decimal::new(1000, 2))
    }
}

#[async_trait]
impl PriceSource for FixedPrice {
    async fn unit_price(&self, _product_code: &str) -> Result<Decimal, PricingError> {
        Ok(self.unit_price)
    }
}
