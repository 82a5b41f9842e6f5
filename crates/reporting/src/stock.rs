//! Low-stock detection and inventory valuation.

use std::collections::HashMap;

use serde::Serialize;

use stockroom_catalog::{Product, ProductId};
use stockroom_core::{DomainError, DomainResult, Money};

/// Derived on-hand quantity per product. Products absent from the map have
/// no movements and therefore hold zero.
pub type StockLevels = HashMap<ProductId, i64>;

fn on_hand(levels: &StockLevels, id: ProductId) -> i64 {
    levels.get(&id).copied().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockEntry {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub on_hand: i64,
    pub reorder_level: i64,
    /// `reorder_level - on_hand`, always positive.
    pub shortfall: i64,
}

/// Active products whose on-hand quantity is strictly below their reorder
/// level, largest shortfall first.
pub fn low_stock(products: &[Product], levels: &StockLevels) -> Vec<LowStockEntry> {
    let mut entries: Vec<_> = products
        .iter()
        .filter(|p| p.is_active())
        .filter_map(|p| {
            let qty = on_hand(levels, p.id);
            (qty < p.reorder_level).then(|| LowStockEntry {
                product_id: p.id,
                sku: p.sku.clone(),
                name: p.name.clone(),
                on_hand: qty,
                reorder_level: p.reorder_level,
                shortfall: p.reorder_level.saturating_sub(qty),
            })
        })
        .collect();
    entries.sort_by(|a, b| b.shortfall.cmp(&a.shortfall).then_with(|| a.sku.cmp(&b.sku)));
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationLine {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub on_hand: i64,
    pub unit_price: Money,
    pub value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationReport {
    pub lines: Vec<ValuationLine>,
    pub total_quantity: i64,
    pub total_value: Money,
}

/// Σ(unit price × on-hand) across the whole catalog, disabled products
/// included since they may still hold stock.
pub fn valuation(products: &[Product], levels: &StockLevels) -> DomainResult<ValuationReport> {
    let overflow = || DomainError::validation("valuation out of range");

    let mut lines = Vec::with_capacity(products.len());
    for p in products {
        let qty = on_hand(levels, p.id);
        lines.push(ValuationLine {
            product_id: p.id,
            sku: p.sku.clone(),
            name: p.name.clone(),
            on_hand: qty,
            unit_price: p.unit_price,
            value: p.unit_price.checked_mul(qty).ok_or_else(overflow)?,
        });
    }
    lines.sort_by(|a, b| a.sku.cmp(&b.sku));

    let total_value = Money::checked_sum(lines.iter().map(|l| l.value)).ok_or_else(overflow)?;
    let total_quantity = lines
        .iter()
        .try_fold(0i64, |acc, l| acc.checked_add(l.on_hand))
        .ok_or_else(overflow)?;

    Ok(ValuationReport {
        lines,
        total_quantity,
        total_value,
    })
}
