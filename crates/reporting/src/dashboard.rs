use serde::Serialize;

use stockroom_catalog::Product;
use stockroom_purchasing::{OrderStatus, PurchaseOrder};

use crate::{low_stock, StockLevels};

/// Window for "recent activity" on the dashboard.
pub const ACTIVITY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardMetrics {
    pub total_products: u64,
    pub movements_last_30_days: u64,
    pub pending_orders: u64,
    pub low_stock_products: u64,
}

/// Headline numbers. `recent_movements` is the count of movements inside
/// [`ACTIVITY_WINDOW_DAYS`], already filtered by the store.
pub fn dashboard_metrics(
    products: &[Product],
    levels: &StockLevels,
    recent_movements: u64,
    orders: &[PurchaseOrder],
) -> DashboardMetrics {
    DashboardMetrics {
        total_products: products.iter().filter(|p| p.is_active()).count() as u64,
        movements_last_30_days: recent_movements,
        pending_orders: orders
            .iter()
            .filter(|o| o.status() == OrderStatus::Pending)
            .count() as u64,
        low_stock_products: low_stock(products, levels).len() as u64,
    }
}
