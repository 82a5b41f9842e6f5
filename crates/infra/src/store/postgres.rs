//! Postgres-backed store.
//!
//! Every mutation runs in its own transaction. Concurrency control:
//!
//! - movements: `SELECT ... FOR UPDATE` on the product row serialises appends
//!   per product, so the stock policy is checked against a quantity nobody
//!   else can change before commit, and `created_at` is floored at the
//!   product's latest entry. Order receipts take the same locks;
//! - orders: `UPDATE ... WHERE version = $n` (optimistic); a loser sees zero
//!   rows affected and gets `StoreError::Concurrency`;
//! - disable / order insert: the product row is locked (`FOR UPDATE` vs
//!   `FOR SHARE`) so the open-order guard cannot race an order insert.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use stockroom_auth::Role;
use stockroom_catalog::{ContactInfo, Product, ProductId, ProductStatus, Supplier, SupplierId};
use stockroom_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Event, ExpectedVersion, Money, UserId,
};
use stockroom_ledger::{
    HistoryPage, HistoryRange, MovementId, MovementKind, PageRequest, ProductStock, RecordMovement,
    StockMovement,
};
use stockroom_purchasing::{OrderFilter, OrderHeader, OrderId, OrderItem, OrderStatus, PurchaseOrder};
use stockroom_reporting::StockLevels;

use super::{
    check_receipt, receipt_entry, stamp_after, AppendMovement, Appended, InventoryStore,
    OrderTransition, StoreError, StoreResult,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MOVEMENT_COLUMNS: &str = "id, sequence, product_id, kind, quantity, actor_id, notes, \
     source_order, idempotency_key, created_at";

const PRODUCT_COLUMNS: &str = "id, sku, name, description, unit_price_cents, reorder_level, \
     unit, status, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, supplier_id, status, order_date, expected_delivery, \
     created_by, created_at, updated_at, version";

const SIGNED_QUANTITY: &str = "CASE kind WHEN 'stock-out' THEN -quantity ELSE quantity END";

/// Postgres-backed [`InventoryStore`].
///
/// Uses a SQLx connection pool, which is `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Creates tables, indexes and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn load_items(
        &self,
        order_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, line_no, product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = get(&row, "order_id")?;
            let line_no: i32 = get(&row, "line_no")?;
            let quantity: i64 = get(&row, "quantity")?;
            let unit_price = Money::from_cents(get(&row, "unit_price_cents")?);
            items.entry(order_id).or_default().push(OrderItem {
                line_no: u32::try_from(line_no).map_err(|_| corrupt("order_items.line_no", line_no))?,
                product_id: ProductId::from_uuid(get(&row, "product_id")?),
                quantity,
                unit_price,
                // Recomputed by `PurchaseOrder::restore`.
                line_total: Money::ZERO,
            });
        }
        Ok(items)
    }

    async fn assemble_orders(&self, rows: Vec<PgRow>) -> StoreResult<Vec<PurchaseOrder>> {
        let headers = rows
            .iter()
            .map(order_header_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        let ids: Vec<Uuid> = headers.iter().map(|h| *h.id.as_uuid()).collect();
        let mut items = self.load_items(&ids).await?;

        headers
            .into_iter()
            .map(|h| {
                let lines = items.remove(h.id.as_uuid()).unwrap_or_default();
                PurchaseOrder::restore(h, lines).map_err(|e| corrupt("purchase_orders", e))
            })
            .collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self, product), fields(product_id = %product.id, sku = %product.sku), err)]
    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, unit_price_cents, reorder_level,
                unit, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(product.reorder_level)
        .bind(&product.unit)
        .bind(product.status.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self, include_disabled: bool) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE $1 OR status = 'active' \
             ORDER BY sku"
        ))
        .bind(include_disabled)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, unit_price_cents = $4,
                reorder_level = $5, unit = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(product.reorder_level)
        .bind(&product.unit)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("product {}", product.id)));
        }
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn disable_product(
        &self,
        product: &Product,
        active_since: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.begin("disable_product").await?;
        let id = product.id.as_uuid();

        let locked = sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("disable_product", e))?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("product {}", product.id)));
        }

        let on_open_order: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM order_items i
                JOIN purchase_orders o ON o.id = i.order_id
                WHERE i.product_id = $1 AND o.status IN ('pending', 'confirmed')
            )
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("disable_product", e))?;
        if on_open_order {
            return Err(StoreError::Referenced(format!(
                "product {} is on an open purchase order",
                product.sku
            )));
        }

        let recently_moved: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM stock_movements WHERE product_id = $1 AND created_at >= $2)",
        )
        .bind(id)
        .bind(active_since)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("disable_product", e))?;
        if recently_moved {
            return Err(StoreError::Referenced(format!(
                "product {} has recent stock movements",
                product.sku
            )));
        }

        sqlx::query("UPDATE products SET status = 'disabled', updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(product.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("disable_product", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("disable_product.commit", e))
    }

    #[instrument(skip(self, supplier), fields(supplier_id = %supplier.id), err)]
    async fn insert_supplier(&self, supplier: &Supplier) -> StoreResult<()> {
        let c = &supplier.contact;
        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, contact_person, email, phone, address, city, country, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(supplier.id.as_uuid())
        .bind(&supplier.name)
        .bind(&c.contact_person)
        .bind(&c.email)
        .bind(&c.phone)
        .bind(&c.address)
        .bind(&c.city)
        .bind(&c.country)
        .bind(supplier.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_supplier", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(supplier_id = %id), err)]
    async fn get_supplier(&self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        let row = sqlx::query("SELECT * FROM suppliers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_supplier", e))?;
        row.as_ref().map(supplier_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let rows = sqlx::query("SELECT * FROM suppliers ORDER BY name, id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_suppliers", e))?;
        rows.iter().map(supplier_from_row).collect()
    }

    #[instrument(skip(self), fields(supplier_id = %id), err)]
    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_supplier", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("supplier {id}")));
        }
        Ok(())
    }

    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.movement.product_id,
            kind = %request.movement.kind,
            quantity = request.movement.quantity,
            sequence = tracing::field::Empty
        ),
        err
    )]
    async fn append_movement(&self, request: AppendMovement) -> StoreResult<Appended> {
        let mut tx = self.begin("append_movement").await?;
        let product_id = request.movement.product_id;

        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;
        let product = match row {
            Some(row) => product_from_row(&row)?,
            None => return Err(StoreError::NotFound(format!("product {product_id}"))),
        };

        if let Some(key) = &request.movement.idempotency_key {
            let existing = sqlx::query(&format!(
                "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE idempotency_key = $1"
            ))
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("append_movement", e))?;
            if let Some(row) = existing {
                let existing = movement_from_row(&row)?;
                if request.movement.matches_recorded(&existing) {
                    return Ok(Appended::Replayed(existing));
                }
                return Err(DomainError::conflict(
                    "idempotency key was already used for a different movement",
                )
                .into());
            }
        }

        if request.require_active {
            product.ensure_active()?;
        }

        let (stock, latest) = product_tail(&mut tx, product_id).await?;
        stock.handle(&RecordMovement {
            movement: request.movement.clone(),
            policy: request.policy,
        })?;

        let mut entry = StockMovement::record(
            request.id,
            request.movement,
            request.actor,
            stamp_after(request.recorded_at, latest),
            0,
        );
        entry.sequence = insert_movement(&mut tx, &entry).await?;
        Span::current().record("sequence", entry.sequence);

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("append_movement.commit", e))?;
        Ok(Appended::Recorded(entry))
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn quantity_of(&self, product_id: ProductId) -> StoreResult<i64> {
        sqlx::query_scalar(&format!(
            "SELECT COALESCE(SUM({SIGNED_QUANTITY}), 0)::BIGINT FROM stock_movements WHERE product_id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("quantity_of", e))
    }

    #[instrument(skip(self, range, page), fields(product_id = %product_id, limit = page.limit), err)]
    async fn history_page(
        &self,
        product_id: ProductId,
        range: HistoryRange,
        page: PageRequest,
    ) -> StoreResult<HistoryPage> {
        let (after_at, after_seq) = match page.cursor {
            Some(c) => (Some(c.created_at), Some(sequence_to_db(c.sequence)?)),
            None => (None, None),
        };
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE product_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND ($3::timestamptz IS NULL OR created_at < $3) \
               AND ($4::timestamptz IS NULL OR (created_at, sequence) > ($4, $5)) \
             ORDER BY created_at, sequence \
             LIMIT $6"
        ))
        .bind(product_id.as_uuid())
        .bind(range.from)
        .bind(range.to)
        .bind(after_at)
        .bind(after_seq)
        .bind((page.limit + 1) as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("history_page", e))?;

        let rows = rows
            .iter()
            .map(movement_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(HistoryPage::from_rows(rows, page.limit))
    }

    #[instrument(skip(self), err)]
    async fn recent_movements(&self, limit: usize) -> StoreResult<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             ORDER BY created_at DESC, sequence DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn movements_in(&self, range: HistoryRange) -> StoreResult<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE ($1::timestamptz IS NULL OR created_at >= $1) \
               AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at, sequence"
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_in", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn count_movements_since(&self, since: DateTime<Utc>) -> StoreResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements_since", e))?;
        Ok(n as u64)
    }

    #[instrument(skip(self), err)]
    async fn stock_levels(&self) -> StoreResult<StockLevels> {
        let rows = sqlx::query(&format!(
            "SELECT product_id, SUM({SIGNED_QUANTITY})::BIGINT AS on_hand \
             FROM stock_movements GROUP BY product_id"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_levels", e))?;

        rows.iter()
            .map(|row| -> StoreResult<(ProductId, i64)> {
                let on_hand: i64 = get(row, "on_hand")?;
                Ok((ProductId::from_uuid(get(row, "product_id")?), on_hand))
            })
            .collect()
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.id_typed(), supplier_id = %order.supplier_id(), lines = order.items().len()),
        err
    )]
    async fn insert_order(&self, order: &PurchaseOrder) -> StoreResult<()> {
        let mut tx = self.begin("insert_order").await?;

        let supplier = sqlx::query("SELECT id FROM suppliers WHERE id = $1 FOR SHARE")
            .bind(order.supplier_id().as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        if supplier.is_none() {
            return Err(StoreError::NotFound(format!("supplier {}", order.supplier_id())));
        }

        let product_ids: Vec<Uuid> = order.items().iter().map(|i| *i.product_id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) FOR SHARE"
        ))
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        let products = rows
            .iter()
            .map(|r| product_from_row(r).map(|p| (p.id, p)))
            .collect::<StoreResult<HashMap<_, _>>>()?;
        for item in order.items() {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| StoreError::NotFound(format!("product {}", item.product_id)))?;
            product.ensure_active()?;
        }

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, supplier_id, status, order_date, expected_delivery,
                created_by, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.supplier_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.order_date())
        .bind(order.expected_delivery())
        .bind(order.created_by().as_uuid())
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(version_to_db(order.version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in order.items() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id_typed().as_uuid())
            .bind(item.line_no as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_order.commit", e))
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> StoreResult<Option<PurchaseOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        match row {
            Some(row) => Ok(self.assemble_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self, filter: OrderFilter) -> StoreResult<Vec<PurchaseOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR supplier_id = $2) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(filter.status.map(OrderStatus::as_str))
        .bind(filter.supplier_id.map(|s| *s.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        self.assemble_orders(rows).await
    }

    #[instrument(
        skip(self, transition),
        fields(
            order_id = %transition.order.id_typed(),
            status = %transition.order.status(),
            expected_version = ?transition.expected
        ),
        err
    )]
    async fn transition_order(
        &self,
        transition: OrderTransition<'_>,
    ) -> StoreResult<Vec<StockMovement>> {
        let order = transition.order;
        let id = order.id_typed();
        let expected = match transition.expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(version_to_db(v)?),
        };

        let mut tx = self.begin("transition_order").await?;
        let result = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $2, updated_at = $3, version = $4
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .bind(version_to_db(order.version())?)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_order", e))?;

        if result.rows_affected() == 0 {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT version FROM purchase_orders WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("transition_order", e))?;
            return Err(match found {
                None => StoreError::NotFound(format!("order {id}")),
                Some(v) => StoreError::Concurrency(format!(
                    "order {id}: expected {:?}, found {v}",
                    transition.expected
                )),
            });
        }

        let receipts_of = transition.event.receipts();
        if !receipts_of.is_empty() {
            // Same lock `append_movement` takes, in id order.
            let mut product_ids: Vec<Uuid> =
                receipts_of.iter().map(|r| *r.product_id.as_uuid()).collect();
            product_ids.sort_unstable();
            product_ids.dedup();
            sqlx::query("SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(&product_ids)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("transition_order", e))?;
        }

        let occurred_at = transition.event.occurred_at();
        let mut receipts = Vec::with_capacity(receipts_of.len());
        for receipt in receipts_of {
            let (stock, latest) = product_tail(&mut tx, receipt.product_id).await?;
            check_receipt(&stock, receipt)?;
            let mut entry =
                receipt_entry(&transition, receipt, stamp_after(occurred_at, latest), 0);
            entry.sequence = insert_movement(&mut tx, &entry).await?;
            receipts.push(entry);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("transition_order.commit", e))?;
        Ok(receipts)
    }

    #[instrument(skip(self), fields(user_id = %user), err)]
    async fn role_of(&self, user: UserId) -> StoreResult<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM profiles WHERE user_id = $1")
            .bind(user.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role_of", e))?;
        role.map(|r| Role::from_str(&r).map_err(|e| corrupt("profiles.role", e)))
            .transpose()
    }

    #[instrument(skip(self), fields(user_id = %user, role = %role), err)]
    async fn assign_role(&self, user: UserId, role: Role) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, role, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id)
            DO UPDATE SET role = EXCLUDED.role, updated_at = now()
            "#,
        )
        .bind(user.as_uuid())
        .bind(role.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;
        Ok(())
    }
}

/// Derived stock and latest entry timestamp of one product, read inside `tx`.
async fn product_tail(
    tx: &mut Transaction<'static, Postgres>,
    product_id: ProductId,
) -> StoreResult<(ProductStock, Option<DateTime<Utc>>)> {
    let totals = sqlx::query(&format!(
        "SELECT COALESCE(SUM({SIGNED_QUANTITY}), 0)::BIGINT AS on_hand, COUNT(*) AS entries, \
                MAX(created_at) AS latest \
         FROM stock_movements WHERE product_id = $1"
    ))
    .bind(product_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("product_tail", e))?;
    let on_hand: i64 = get(&totals, "on_hand")?;
    let entries: i64 = get(&totals, "entries")?;
    let latest: Option<DateTime<Utc>> = get(&totals, "latest")?;
    Ok((
        ProductStock::at(product_id, on_hand, entries as u64),
        latest,
    ))
}

/// Inserts one ledger row and returns the sequence the database assigned.
async fn insert_movement(
    tx: &mut Transaction<'static, Postgres>,
    entry: &StockMovement,
) -> StoreResult<u64> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO stock_movements (
            id, product_id, kind, quantity, actor_id, notes,
            source_order, idempotency_key, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING sequence
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.product_id.as_uuid())
    .bind(entry.kind.as_str())
    .bind(entry.quantity)
    .bind(entry.actor_id.as_uuid())
    .bind(&entry.notes)
    .bind(entry.source_order.map(|o| *o.as_uuid()))
    .bind(&entry.idempotency_key)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    u64::try_from(sequence).map_err(|_| corrupt("stock_movements.sequence", sequence))
}

// -- row mapping ------------------------------------------------------------

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| map_sqlx_error(column, e))
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("unreadable {what}: {detail}"))
}

fn sequence_to_db(sequence: u64) -> StoreResult<i64> {
    i64::try_from(sequence).map_err(|_| StoreError::Rejected(DomainError::validation("cursor out of range")))
}

fn version_to_db(version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| corrupt("version", version))
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    let status: String = get(row, "status")?;
    Ok(Product {
        id: ProductId::from_uuid(get(row, "id")?),
        sku: get(row, "sku")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        unit_price: Money::from_cents(get(row, "unit_price_cents")?),
        reorder_level: get(row, "reorder_level")?,
        unit: get(row, "unit")?,
        status: ProductStatus::from_str(&status).map_err(|e| corrupt("products.status", e))?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn supplier_from_row(row: &PgRow) -> StoreResult<Supplier> {
    Ok(Supplier {
        id: SupplierId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        contact: ContactInfo {
            contact_person: get(row, "contact_person")?,
            email: get(row, "email")?,
            phone: get(row, "phone")?,
            address: get(row, "address")?,
            city: get(row, "city")?,
            country: get(row, "country")?,
        },
        created_at: get(row, "created_at")?,
    })
}

fn movement_from_row(row: &PgRow) -> StoreResult<StockMovement> {
    let kind: String = get(row, "kind")?;
    let sequence: i64 = get(row, "sequence")?;
    let source_order: Option<Uuid> = get(row, "source_order")?;
    Ok(StockMovement {
        id: MovementId::from_uuid(get(row, "id")?),
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        kind: MovementKind::from_str(&kind).map_err(|e| corrupt("stock_movements.kind", e))?,
        quantity: get(row, "quantity")?,
        actor_id: UserId::from_uuid(get(row, "actor_id")?),
        notes: get(row, "notes")?,
        source_order: source_order.map(AggregateId::from_uuid),
        idempotency_key: get(row, "idempotency_key")?,
        created_at: get(row, "created_at")?,
        sequence: u64::try_from(sequence).map_err(|_| corrupt("stock_movements.sequence", sequence))?,
    })
}

fn order_header_from_row(row: &PgRow) -> StoreResult<OrderHeader> {
    let status: String = get(row, "status")?;
    let version: i64 = get(row, "version")?;
    let order_date: NaiveDate = get(row, "order_date")?;
    Ok(OrderHeader {
        id: OrderId::from_uuid(get(row, "id")?),
        supplier_id: SupplierId::from_uuid(get(row, "supplier_id")?),
        status: OrderStatus::from_str(&status).map_err(|e| corrupt("purchase_orders.status", e))?,
        order_date,
        expected_delivery: get(row, "expected_delivery")?,
        created_by: UserId::from_uuid(get(row, "created_by")?),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        version: u64::try_from(version).map_err(|_| corrupt("purchase_orders.version", version))?,
    })
}

/// Map sqlx errors onto the store taxonomy.
///
/// Postgres SQLSTATE codes: 23505 unique, 23503 foreign key, 23514 check,
/// 40001/40P01 serialization failure/deadlock, class 08 connection errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(if constraint.is_empty() {
                    msg
                } else {
                    constraint
                }),
                Some("23503") => StoreError::Referenced(msg),
                Some("23514") => StoreError::Rejected(DomainError::validation(msg)),
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                Some(code) if code.starts_with("08") || code == "57P01" => StoreError::Transient(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Transient(format!("connection unavailable in {}: {}", operation, err))
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
