//! Read-side aggregation over the catalog, the ledger and purchase orders.
//!
//! Every function here is pure and recomputes from the rows it is handed;
//! nothing is cached between calls.

pub mod dashboard;
pub mod series;
pub mod spend;
pub mod stock;

pub use dashboard::{dashboard_metrics, DashboardMetrics, ACTIVITY_WINDOW_DAYS};
pub use series::{movement_series, SeriesPoint, SeriesWindow, DEFAULT_MAX_SERIES_DAYS};
pub use spend::{supplier_spend, SpendReport, SupplierSpend};
pub use stock::{low_stock, valuation, LowStockEntry, StockLevels, ValuationLine, ValuationReport};
