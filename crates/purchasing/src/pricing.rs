use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockroom_catalog::{ProductId, SupplierId};
use stockroom_core::{DomainError, DomainResult, Money};

/// Where line prices come from when an order is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingPolicy {
    /// Always the current catalog price; submitted prices are ignored.
    #[default]
    Catalog,
    /// A submitted price wins; the catalog price fills the gaps.
    Submitted,
}

impl PricingPolicy {
    pub fn resolve(self, catalog: Money, submitted: Option<Money>) -> DomainResult<Money> {
        let price = match (self, submitted) {
            (PricingPolicy::Submitted, Some(p)) => p,
            _ => catalog,
        };
        if price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        Ok(price)
    }
}

/// Order placement request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_delivery: Option<NaiveDate>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Client-side price; advisory unless pricing is `submitted`.
    #[serde(default)]
    pub unit_price: Option<Money>,
}

/// A line whose authoritative price has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_policy_ignores_submitted_price() {
        let price = PricingPolicy::Catalog
            .resolve(Money::from_cents(200), Some(Money::from_cents(1)))
            .unwrap();
        assert_eq!(price, Money::from_cents(200));
    }

    #[test]
    fn submitted_policy_prefers_submission_and_falls_back() {
        let policy = PricingPolicy::Submitted;
        assert_eq!(
            policy.resolve(Money::from_cents(200), Some(Money::from_cents(150))).unwrap(),
            Money::from_cents(150)
        );
        assert_eq!(
            policy.resolve(Money::from_cents(200), None).unwrap(),
            Money::from_cents(200)
        );
    }

    #[test]
    fn negative_submitted_price_is_rejected() {
        assert!(PricingPolicy::Submitted
            .resolve(Money::from_cents(200), Some(Money::from_cents(-5)))
            .is_err());
    }
}
