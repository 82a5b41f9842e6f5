//! Persisted-store boundary.
//!
//! [`InventoryStore`] exposes coarse, logical operations. Each mutating call is
//! one atomic unit: it either commits entirely or leaves the store unchanged.
//! Correctness-critical checks (stock sufficiency, order version, references)
//! are re-validated inside that unit, never trusted from an earlier read.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryStore`]: a single lock around plain collections, for tests/dev.
//! - [`PostgresStore`]: sqlx over Postgres, row locks + conditional updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_auth::Role;
use stockroom_catalog::{Product, ProductId, Supplier, SupplierId};
use stockroom_core::{Aggregate, DomainError, ExpectedVersion, UserId};
use stockroom_ledger::{
    HistoryPage, HistoryRange, MovementId, NegativeStockPolicy, NewMovement, PageRequest,
    ProductStock, RecordMovement, StockMovement,
};
use stockroom_purchasing::{OrderEvent, OrderFilter, OrderId, PurchaseOrder};
use stockroom_reporting::StockLevels;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Delete or disable blocked by something that still points at the row.
    #[error("still referenced: {0}")]
    Referenced(String),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A domain rule re-checked inside the transaction failed.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// Connectivity problem; safe to retry for reads.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// One movement to append, already validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendMovement {
    pub id: MovementId,
    pub movement: NewMovement,
    pub actor: UserId,
    pub policy: NegativeStockPolicy,
    /// Reject movements against disabled products.
    pub require_active: bool,
    /// Clock reading. The store moves it forward to the product's latest
    /// entry if it would sort before it.
    pub recorded_at: DateTime<Utc>,
}

/// Result of an append: either a new entry or the entry an earlier request
/// with the same idempotency key produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Appended {
    Recorded(StockMovement),
    Replayed(StockMovement),
}

impl Appended {
    pub fn movement(&self) -> &StockMovement {
        match self {
            Appended::Recorded(m) | Appended::Replayed(m) => m,
        }
    }

    pub fn into_movement(self) -> StockMovement {
        match self {
            Appended::Recorded(m) | Appended::Replayed(m) => m,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Appended::Replayed(_))
    }
}

/// An order state change to persist.
///
/// `order` is the aggregate after the event was applied; `expected` is the
/// version it had when loaded. Receipt movements carried by the event are
/// inserted in the same unit as the status change.
#[derive(Debug, Clone, Copy)]
pub struct OrderTransition<'a> {
    pub order: &'a PurchaseOrder,
    pub expected: ExpectedVersion,
    pub event: &'a OrderEvent,
    pub actor: UserId,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    // -- catalog --------------------------------------------------------

    /// Fails with `UniqueViolation` when the SKU is taken.
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Ordered by SKU.
    async fn list_products(&self, include_disabled: bool) -> StoreResult<Vec<Product>>;

    /// Overwrites the mutable fields of an existing product.
    async fn update_product(&self, product: &Product) -> StoreResult<()>;

    /// Marks the product disabled unless an open order line references it or
    /// it has movements at or after `active_since` (`Referenced`).
    async fn disable_product(
        &self,
        product: &Product,
        active_since: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn insert_supplier(&self, supplier: &Supplier) -> StoreResult<()>;

    async fn get_supplier(&self, id: SupplierId) -> StoreResult<Option<Supplier>>;

    /// Ordered by name.
    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>>;

    /// `Referenced` while any order names the supplier.
    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()>;

    // -- ledger ---------------------------------------------------------

    /// Append under a per-product lock, re-checking the stock policy against
    /// the quantity derived inside the same unit.
    async fn append_movement(&self, request: AppendMovement) -> StoreResult<Appended>;

    /// Signed sum of every movement of the product.
    async fn quantity_of(&self, product_id: ProductId) -> StoreResult<i64>;

    /// One page of `(created_at, sequence)`-ordered history.
    async fn history_page(
        &self,
        product_id: ProductId,
        range: HistoryRange,
        page: PageRequest,
    ) -> StoreResult<HistoryPage>;

    /// Newest first across all products.
    async fn recent_movements(&self, limit: usize) -> StoreResult<Vec<StockMovement>>;

    /// Every movement inside `range`, oldest first.
    async fn movements_in(&self, range: HistoryRange) -> StoreResult<Vec<StockMovement>>;

    async fn count_movements_since(&self, since: DateTime<Utc>) -> StoreResult<u64>;

    /// Derived on-hand quantity of every product with at least one movement.
    async fn stock_levels(&self) -> StoreResult<StockLevels>;

    // -- purchasing -----------------------------------------------------

    /// Inserts header and lines together. Re-checks that the supplier exists
    /// and every product is still active.
    async fn insert_order(&self, order: &PurchaseOrder) -> StoreResult<()>;

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<PurchaseOrder>>;

    /// Newest first.
    async fn list_orders(&self, filter: OrderFilter) -> StoreResult<Vec<PurchaseOrder>>;

    /// Conditional status update plus receipt inserts, atomically.
    /// `Concurrency` when the stored version no longer matches. Receipts take
    /// the same per-product lock, overflow check and timestamp floor as
    /// [`append_movement`](Self::append_movement).
    async fn transition_order(
        &self,
        transition: OrderTransition<'_>,
    ) -> StoreResult<Vec<StockMovement>>;

    // -- role directory -------------------------------------------------

    async fn role_of(&self, user: UserId) -> StoreResult<Option<Role>>;

    async fn assign_role(&self, user: UserId, role: Role) -> StoreResult<()>;
}

/// `now`, or the product's latest entry timestamp if that is later.
///
/// Applied under the per-product lock so `(created_at, sequence)` order
/// matches commit order and a handed-out history cursor never skips a row.
pub(crate) fn stamp_after(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    latest.map_or(now, |latest| now.max(latest))
}

/// Re-checks one order receipt against the product's derived quantity.
pub(crate) fn check_receipt(stock: &ProductStock, receipt: &NewMovement) -> StoreResult<()> {
    stock.handle(&RecordMovement {
        movement: receipt.clone(),
        policy: NegativeStockPolicy::Allow,
    })?;
    Ok(())
}

/// Ledger entry for one receipt of `transition`.
pub(crate) fn receipt_entry(
    transition: &OrderTransition<'_>,
    receipt: &NewMovement,
    at: DateTime<Utc>,
    sequence: u64,
) -> StockMovement {
    StockMovement::record(MovementId::new(), receipt.clone(), transition.actor, at, sequence)
}
