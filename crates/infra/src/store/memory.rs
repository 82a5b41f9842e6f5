use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_auth::Role;
use stockroom_catalog::{Product, ProductId, ProductStatus, Supplier, SupplierId};
use stockroom_core::{Aggregate, AggregateRoot, DomainError, DomainResult, Event, UserId};
use stockroom_ledger::{
    checked_total, HistoryPage, HistoryRange, PageRequest, ProductStock, RecordMovement,
    StockMovement,
};
use stockroom_purchasing::{OrderFilter, OrderId, PurchaseOrder};
use stockroom_reporting::StockLevels;

use super::{
    check_receipt, receipt_entry, stamp_after, AppendMovement, Appended, InventoryStore,
    OrderTransition, StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    suppliers: HashMap<SupplierId, Supplier>,
    /// Append order; `sequence` is the index + 1.
    movements: Vec<StockMovement>,
    idempotency_keys: HashMap<String, usize>,
    orders: HashMap<OrderId, PurchaseOrder>,
    profiles: HashMap<UserId, Role>,
}

impl State {
    fn next_sequence(&self) -> u64 {
        self.movements.len() as u64 + 1
    }

    fn movements_of(&self, product_id: ProductId) -> impl Iterator<Item = &StockMovement> {
        self.movements
            .iter()
            .filter(move |m| m.product_id == product_id)
    }

    /// Derived stock and latest timestamp of a product, counting `pending`
    /// entries that are not pushed yet.
    fn tail_of(
        &self,
        product_id: ProductId,
        pending: &[StockMovement],
    ) -> DomainResult<(ProductStock, Option<DateTime<Utc>>)> {
        let stock = ProductStock::from_movements(product_id, self.movements.iter().chain(pending))?;
        let latest = self
            .movements_of(product_id)
            .chain(pending.iter().filter(|m| m.product_id == product_id))
            .map(|m| m.created_at)
            .max();
        Ok((stock, latest))
    }

    fn sorted<'a>(movements: impl Iterator<Item = &'a StockMovement>) -> Vec<StockMovement> {
        let mut out: Vec<_> = movements.cloned().collect();
        out.sort_by_key(|m| (m.created_at, m.sequence));
        out
    }
}

/// In-memory store.
///
/// Intended for tests/dev. Every operation takes the single lock, so each
/// mutation is trivially atomic and serialised.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::UniqueViolation(format!("sku {}", product.sku)));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self, include_disabled: bool) -> StoreResult<Vec<Product>> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .products
            .values()
            .filter(|p| include_disabled || p.is_active())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(out)
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::NotFound(format!("product {}", product.id)))?;
        *stored = Product {
            sku: stored.sku.clone(),
            status: stored.status,
            created_at: stored.created_at,
            ..product.clone()
        };
        Ok(())
    }

    async fn disable_product(
        &self,
        product: &Product,
        active_since: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.products.contains_key(&product.id) {
            return Err(StoreError::NotFound(format!("product {}", product.id)));
        }
        if state
            .orders
            .values()
            .any(|o| o.is_open() && o.references_product(product.id))
        {
            return Err(StoreError::Referenced(format!(
                "product {} is on an open purchase order",
                product.sku
            )));
        }
        if state
            .movements_of(product.id)
            .any(|m| m.created_at >= active_since)
        {
            return Err(StoreError::Referenced(format!(
                "product {} has recent stock movements",
                product.sku
            )));
        }
        if let Some(stored) = state.products.get_mut(&product.id) {
            stored.status = ProductStatus::Disabled;
            stored.updated_at = product.updated_at;
        }
        Ok(())
    }

    async fn insert_supplier(&self, supplier: &Supplier) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.suppliers.contains_key(&supplier.id) {
            return Err(StoreError::UniqueViolation(format!("supplier {}", supplier.id)));
        }
        state.suppliers.insert(supplier.id, supplier.clone());
        Ok(())
    }

    async fn get_supplier(&self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        Ok(self.read()?.suppliers.get(&id).cloned())
    }

    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let mut out: Vec<_> = self.read()?.suppliers.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.suppliers.contains_key(&id) {
            return Err(StoreError::NotFound(format!("supplier {id}")));
        }
        if state.orders.values().any(|o| o.supplier_id() == id) {
            return Err(StoreError::Referenced(format!(
                "supplier {id} has purchase orders"
            )));
        }
        state.suppliers.remove(&id);
        Ok(())
    }

    async fn append_movement(&self, request: AppendMovement) -> StoreResult<Appended> {
        let mut state = self.write()?;
        let product_id = request.movement.product_id;

        if let Some(key) = &request.movement.idempotency_key {
            if let Some(&idx) = state.idempotency_keys.get(key) {
                let existing = &state.movements[idx];
                if request.movement.matches_recorded(existing) {
                    return Ok(Appended::Replayed(existing.clone()));
                }
                return Err(DomainError::conflict(
                    "idempotency key was already used for a different movement",
                )
                .into());
            }
        }

        let product = state
            .products
            .get(&product_id)
            .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))?;
        if request.require_active {
            product.ensure_active()?;
        }

        let (stock, latest) = state.tail_of(product_id, &[])?;
        stock.handle(&RecordMovement {
            movement: request.movement.clone(),
            policy: request.policy,
        })?;

        let entry = StockMovement::record(
            request.id,
            request.movement,
            request.actor,
            stamp_after(request.recorded_at, latest),
            state.next_sequence(),
        );
        if let Some(key) = &entry.idempotency_key {
            let idx = state.movements.len();
            state.idempotency_keys.insert(key.clone(), idx);
        }
        state.movements.push(entry.clone());
        Ok(Appended::Recorded(entry))
    }

    async fn quantity_of(&self, product_id: ProductId) -> StoreResult<i64> {
        let state = self.read()?;
        Ok(checked_total(
            state
                .movements_of(product_id)
                .map(StockMovement::signed_quantity),
        )?)
    }

    async fn history_page(
        &self,
        product_id: ProductId,
        range: HistoryRange,
        page: PageRequest,
    ) -> StoreResult<HistoryPage> {
        let state = self.read()?;
        let rows: Vec<_> = State::sorted(state.movements_of(product_id))
            .into_iter()
            .filter(|m| range.contains(m.created_at) && page.admits(m))
            .take(page.limit + 1)
            .collect();
        Ok(HistoryPage::from_rows(rows, page.limit))
    }

    async fn recent_movements(&self, limit: usize) -> StoreResult<Vec<StockMovement>> {
        let state = self.read()?;
        let mut rows = State::sorted(state.movements.iter());
        rows.reverse();
        rows.truncate(limit);
        Ok(rows)
    }

    async fn movements_in(&self, range: HistoryRange) -> StoreResult<Vec<StockMovement>> {
        let state = self.read()?;
        Ok(State::sorted(
            state.movements.iter().filter(|m| range.contains(m.created_at)),
        ))
    }

    async fn count_movements_since(&self, since: DateTime<Utc>) -> StoreResult<u64> {
        let state = self.read()?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.created_at >= since)
            .count() as u64)
    }

    async fn stock_levels(&self) -> StoreResult<StockLevels> {
        let state = self.read()?;
        let mut deltas: HashMap<ProductId, Vec<i64>> = HashMap::new();
        for m in &state.movements {
            deltas.entry(m.product_id).or_default().push(m.signed_quantity());
        }
        let mut levels = StockLevels::new();
        for (product_id, deltas) in deltas {
            levels.insert(product_id, checked_total(deltas)?);
        }
        Ok(levels)
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.suppliers.contains_key(&order.supplier_id()) {
            return Err(StoreError::NotFound(format!("supplier {}", order.supplier_id())));
        }
        for item in order.items() {
            let product = state
                .products
                .get(&item.product_id)
                .ok_or_else(|| StoreError::NotFound(format!("product {}", item.product_id)))?;
            product.ensure_active()?;
        }
        if state.orders.contains_key(&order.id_typed()) {
            return Err(StoreError::UniqueViolation(format!("order {}", order.id_typed())));
        }
        state.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> StoreResult<Vec<PurchaseOrder>> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(out)
    }

    async fn transition_order(
        &self,
        transition: OrderTransition<'_>,
    ) -> StoreResult<Vec<StockMovement>> {
        let mut state = self.write()?;
        let id = transition.order.id_typed();
        let current = state
            .orders
            .get(&id)
            .map(|o| o.version())
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        if !transition.expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "order {id}: expected {:?}, found {current}",
                transition.expected
            )));
        }

        let occurred_at = transition.event.occurred_at();
        let first_sequence = state.next_sequence();
        let mut receipts: Vec<StockMovement> = Vec::new();
        for receipt in transition.event.receipts() {
            let (stock, latest) = state.tail_of(receipt.product_id, &receipts)?;
            check_receipt(&stock, receipt)?;
            let sequence = first_sequence + receipts.len() as u64;
            receipts.push(receipt_entry(
                &transition,
                receipt,
                stamp_after(occurred_at, latest),
                sequence,
            ));
        }
        state.movements.extend(receipts.iter().cloned());
        state.orders.insert(id, transition.order.clone());
        Ok(receipts)
    }

    async fn role_of(&self, user: UserId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.profiles.get(&user).copied())
    }

    async fn assign_role(&self, user: UserId, role: Role) -> StoreResult<()> {
        self.write()?.profiles.insert(user, role);
        Ok(())
    }
}
