//! Stock ledger domain module.
//!
//! The ledger is an append-only log of [`StockMovement`]s. On-hand quantity is
//! never stored; it is the fold of a product's movements ([`ProductStock`]).

pub mod history;
pub mod movement;
pub mod stock;

pub use history::{HistoryCursor, HistoryPage, HistoryRange, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use movement::{MovementId, MovementKind, NewMovement, StockMovement};
pub use stock::{checked_total, current_quantity, NegativeStockPolicy, ProductStock, RecordMovement, StockDelta};
