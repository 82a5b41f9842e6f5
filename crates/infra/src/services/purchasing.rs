use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use stockroom_auth::{authorize, Principal, RoleSet};
use stockroom_core::{Aggregate, AggregateRoot, ExpectedVersion};
use stockroom_ledger::StockMovement;
use stockroom_purchasing::{
    NewOrder, OrderAction, OrderFilter, OrderId, OrderStatus, PricedLine, PricingPolicy,
    PurchaseOrder, TransitionOrder,
};

use super::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{OrderTransition, StoreError};

/// Result of a successful transition. `receipts` is non-empty only for
/// delivery: one stock-in per order line.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: PurchaseOrder,
    pub receipts: Vec<StockMovement>,
}

/// Supplier orders and their lifecycle.
#[derive(Clone)]
pub struct PurchaseOrderEngine {
    ctx: Arc<ServiceContext>,
}

impl PurchaseOrderEngine {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Place a `pending` order. Prices follow the configured
    /// [`PricingPolicy`]; the total is always computed here.
    #[instrument(
        skip(self, principal, input),
        fields(actor = %principal.id, supplier_id = %input.supplier_id, lines = input.items.len()),
        err
    )]
    pub async fn create_order(
        &self,
        principal: &Principal,
        input: NewOrder,
    ) -> ServiceResult<PurchaseOrder> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        if input.items.is_empty() {
            return Err(ServiceError::EmptyOrder);
        }

        let store = &self.ctx.store;
        let supplier_id = input.supplier_id;
        if self
            .ctx
            .reads
            .run("get_supplier", || store.get_supplier(supplier_id))
            .await?
            .is_none()
        {
            return Err(ServiceError::UnknownSupplier(supplier_id));
        }

        let pricing = self.ctx.policies.pricing;
        let mut lines = Vec::with_capacity(input.items.len());
        for item in input.items {
            let product_id = item.product_id;
            let product = self
                .ctx
                .reads
                .run("get_product", || store.get_product(product_id))
                .await?
                .ok_or(ServiceError::UnknownProduct(product_id))?;
            product.ensure_active()?;

            let unit_price = pricing.resolve(product.unit_price, item.unit_price)?;
            if let Some(submitted) = item.unit_price {
                if pricing == PricingPolicy::Catalog && submitted != product.unit_price {
                    warn!(
                        product_id = %product.id,
                        submitted = %submitted,
                        catalog = %product.unit_price,
                        "submitted unit price ignored in favour of the catalog price"
                    );
                }
            }
            lines.push(PricedLine {
                product_id,
                quantity: item.quantity,
                unit_price,
            });
        }

        let now = self.ctx.clock.now();
        let order = PurchaseOrder::place(
            OrderId::new(),
            supplier_id,
            lines,
            input.order_date.unwrap_or_else(|| now.date_naive()),
            input.expected_delivery,
            principal.id,
            now,
        )?;
        self.ctx.store.insert_order(&order).await?;

        info!(
            order_id = %order.id_typed(),
            supplier_id = %supplier_id,
            total = %order.total_amount(),
            "purchase order created"
        );
        Ok(order)
    }

    pub async fn get_order(&self, principal: &Principal, id: OrderId) -> ServiceResult<PurchaseOrder> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;
        self.load(id).await
    }

    /// Newest first.
    pub async fn list_orders(
        &self,
        principal: &Principal,
        filter: OrderFilter,
    ) -> ServiceResult<Vec<PurchaseOrder>> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;
        let store = &self.ctx.store;
        Ok(self
            .ctx
            .reads
            .run("list_orders", || store.list_orders(filter))
            .await?)
    }

    /// Apply `action` to the order.
    ///
    /// The status change and, for `deliver`, the receipt movements commit
    /// together under an optimistic version check. Of two racing calls only
    /// one commits; the other reports `AlreadyDelivered` (deliver) or a
    /// concurrency conflict.
    #[instrument(
        skip(self, principal),
        fields(actor = %principal.id, order_id = %id, action = action.as_str()),
        err
    )]
    pub async fn transition(
        &self,
        principal: &Principal,
        id: OrderId,
        action: OrderAction,
    ) -> ServiceResult<TransitionOutcome> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        let mut order = self.load(id).await?;
        if let Some(err) = already_delivered(&order, action) {
            return Err(err);
        }
        let from = order.status();
        let expected = ExpectedVersion::Exact(order.version());

        let events = order.handle(&TransitionOrder {
            action,
            occurred_at: self.ctx.clock.now(),
        })?;
        for event in &events {
            order.apply(event);
        }

        let mut receipts = Vec::new();
        for event in &events {
            let written = self
                .ctx
                .store
                .transition_order(OrderTransition {
                    order: &order,
                    expected,
                    event,
                    actor: principal.id,
                })
                .await;
            match written {
                Ok(mut entries) => receipts.append(&mut entries),
                Err(StoreError::Concurrency(msg)) => {
                    let current = self.load(id).await?;
                    return Err(already_delivered(&current, action)
                        .unwrap_or(ServiceError::Concurrency(msg)));
                }
                Err(other) => return Err(other.into()),
            }
        }

        info!(
            order_id = %id,
            from = from.as_str(),
            to = order.status().as_str(),
            receipts = receipts.len(),
            "purchase order transitioned"
        );
        Ok(TransitionOutcome { order, receipts })
    }

    async fn load(&self, id: OrderId) -> ServiceResult<PurchaseOrder> {
        let store = &self.ctx.store;
        self.ctx
            .reads
            .run("get_order", || store.get_order(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))
    }
}

fn already_delivered(order: &PurchaseOrder, action: OrderAction) -> Option<ServiceError> {
    (action == OrderAction::Deliver && order.status() == OrderStatus::Delivered)
        .then(|| ServiceError::AlreadyDelivered(order.id_typed()))
}

#[cfg(test)]
mod tests {
    use stockroom_auth::Role;
    use stockroom_catalog::ProductId;
    use stockroom_core::{ErrorKind, Money};
    use chrono::Duration;
    use stockroom_ledger::{MovementKind, NewMovement};
    use stockroom_purchasing::NewOrderItem;

    use super::*;
    use crate::services::testing::{admin, harness, harness_with, principal, Harness};
    use crate::store::InventoryStore;
    use crate::services::Policies;

    fn item(product_id: ProductId, quantity: i64, cents: Option<i64>) -> NewOrderItem {
        NewOrderItem {
            product_id,
            quantity,
            unit_price: cents.map(Money::from_cents),
        }
    }

    async fn widget_order(h: &Harness) -> (PurchaseOrder, ProductId, ProductId) {
        let a = h.product("A", 200, 0).await;
        let b = h.product("B", 300, 0).await;
        let s = h.supplier("Acme").await;
        let order = h
            .services
            .purchasing
            .create_order(
                &admin(),
                NewOrder {
                    supplier_id: s.id,
                    order_date: None,
                    expected_delivery: None,
                    items: vec![item(a.id, 10, None), item(b.id, 5, None)],
                },
            )
            .await
            .unwrap();
        (order, a.id, b.id)
    }

    #[tokio::test]
    async fn total_is_computed_from_catalog_prices() {
        let h = harness();
        let (order, _, _) = widget_order(&h).await;
        assert_eq!(order.total_amount(), Money::from_cents(3500));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.order_date(), h.clock_today());
    }

    #[tokio::test]
    async fn catalog_pricing_ignores_submitted_prices() {
        let h = harness();
        let a = h.product("A", 200, 0).await;
        let s = h.supplier("Acme").await;
        let order = h
            .services
            .purchasing
            .create_order(
                &admin(),
                NewOrder {
                    supplier_id: s.id,
                    order_date: None,
                    expected_delivery: None,
                    items: vec![item(a.id, 1, Some(1))],
                },
            )
            .await
            .unwrap();
        assert_eq!(order.total_amount(), Money::from_cents(200));
    }

    #[tokio::test]
    async fn submitted_pricing_trusts_the_caller() {
        let h = harness_with(Policies {
            pricing: PricingPolicy::Submitted,
            ..Policies::default()
        });
        let a = h.product("A", 200, 0).await;
        let s = h.supplier("Acme").await;
        let order = h
            .services
            .purchasing
            .create_order(
                &admin(),
                NewOrder {
                    supplier_id: s.id,
                    order_date: None,
                    expected_delivery: None,
                    items: vec![item(a.id, 2, Some(150)), item(a.id, 1, None)],
                },
            )
            .await
            .unwrap();
        assert_eq!(order.total_amount(), Money::from_cents(500));
    }

    #[tokio::test]
    async fn invalid_orders_are_rejected() {
        let h = harness();
        let a = h.product("A", 200, 0).await;
        let s = h.supplier("Acme").await;
        let engine = &h.services.purchasing;
        let order = |supplier_id, items| NewOrder {
            supplier_id,
            order_date: None,
            expected_delivery: None,
            items,
        };

        let err = engine.create_order(&admin(), order(s.id, vec![])).await.unwrap_err();
        assert_eq!(err, ServiceError::EmptyOrder);
        assert_eq!(err.kind(), ErrorKind::Validation);

        for qty in [0, -3] {
            let err = engine
                .create_order(&admin(), order(s.id, vec![item(a.id, qty, None)]))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let ghost = ProductId::new();
        let err = engine
            .create_order(&admin(), order(s.id, vec![item(ghost, 1, None)]))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::UnknownProduct(ghost));

        let nobody = stockroom_catalog::SupplierId::new();
        let err = engine
            .create_order(&admin(), order(nobody, vec![item(a.id, 1, None)]))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::UnknownSupplier(nobody));

        let err = engine
            .create_order(&principal(Role::StockController), order(s.id, vec![item(a.id, 1, None)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert!(engine.list_orders(&admin(), OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_receives_every_line_exactly_once() {
        let h = harness();
        let (order, a, b) = widget_order(&h).await;
        let engine = &h.services.purchasing;
        let id = order.id_typed();

        let err = engine.transition(&admin(), id, OrderAction::Deliver).await.unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        engine.transition(&admin(), id, OrderAction::Confirm).await.unwrap();
        let delivered = engine.transition(&admin(), id, OrderAction::Deliver).await.unwrap();
        assert_eq!(delivered.order.status(), OrderStatus::Delivered);
        assert_eq!(delivered.receipts.len(), 2);
        assert!(delivered.receipts.iter().all(|m| m.source_order == Some(id.0)));

        let ledger = &h.services.ledger;
        assert_eq!(ledger.current_quantity(&admin(), a).await.unwrap(), 10);
        assert_eq!(ledger.current_quantity(&admin(), b).await.unwrap(), 5);

        let err = engine.transition(&admin(), id, OrderAction::Deliver).await.unwrap_err();
        assert_eq!(err, ServiceError::AlreadyDelivered(id));
        assert_eq!(ledger.current_quantity(&admin(), a).await.unwrap(), 10);

        let err = engine.transition(&admin(), id, OrderAction::Cancel).await.unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deliveries_apply_stock_once() {
        let h = harness();
        let (order, a, _) = widget_order(&h).await;
        let id = order.id_typed();
        h.services
            .purchasing
            .transition(&admin(), id, OrderAction::Confirm)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = h.services.purchasing.clone();
            tasks.push(tokio::spawn(async move {
                engine.transition(&admin(), id, OrderAction::Deliver).await
            }));
        }
        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(err) => assert!(
                    matches!(err, ServiceError::AlreadyDelivered(_) | ServiceError::Concurrency(_)),
                    "unexpected {err:?}"
                ),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(h.services.ledger.current_quantity(&admin(), a).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn delivery_that_would_overflow_stock_is_refused() {
        let h = harness();
        let free = h.product("FREE", 0, 0).await;
        let s = h.supplier("Acme").await;
        h.services
            .ledger
            .record_movement(&admin(), NewMovement::new(free.id, MovementKind::StockIn, 1))
            .await
            .unwrap();

        let engine = &h.services.purchasing;
        let order = engine
            .create_order(
                &admin(),
                NewOrder {
                    supplier_id: s.id,
                    order_date: None,
                    expected_delivery: None,
                    items: vec![item(free.id, i64::MAX, None)],
                },
            )
            .await
            .unwrap();
        let id = order.id_typed();
        engine.transition(&admin(), id, OrderAction::Confirm).await.unwrap();

        let err = engine.transition(&admin(), id, OrderAction::Deliver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.services.ledger.current_quantity(&admin(), free.id).await.unwrap(), 1);
        assert_eq!(engine.get_order(&admin(), id).await.unwrap().status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn receipts_never_sort_before_the_products_latest_movement() {
        let h = harness();
        let (order, a, _) = widget_order(&h).await;
        let id = order.id_typed();
        let engine = &h.services.purchasing;
        engine.transition(&admin(), id, OrderAction::Confirm).await.unwrap();

        let t = h.clock_now();
        h.clock.set(t + Duration::seconds(5));
        let manual = h
            .services
            .ledger
            .record_movement(&admin(), NewMovement::new(a, MovementKind::StockIn, 1))
            .await
            .unwrap()
            .into_movement();

        h.clock.set(t);
        let delivered = engine.transition(&admin(), id, OrderAction::Deliver).await.unwrap();
        let receipt = delivered.receipts.iter().find(|m| m.product_id == a).unwrap();
        assert_eq!(receipt.created_at, manual.created_at);
        assert!(receipt.sequence > manual.sequence);
    }

    #[tokio::test]
    async fn stale_version_loses_the_race() {
        let h = harness();
        let (order, a, _) = widget_order(&h).await;
        let id = order.id_typed();
        let engine = &h.services.purchasing;
        engine.transition(&admin(), id, OrderAction::Confirm).await.unwrap();

        // A writer holding the pre-delivery snapshot tries to commit after
        // the real delivery went through.
        let mut stale = engine.get_order(&admin(), id).await.unwrap();
        let expected = ExpectedVersion::Exact(stale.version());
        engine.transition(&admin(), id, OrderAction::Deliver).await.unwrap();

        let events = stale
            .handle(&TransitionOrder {
                action: OrderAction::Deliver,
                occurred_at: h.clock_now(),
            })
            .unwrap();
        stale.apply(&events[0]);
        let err = h
            .store
            .transition_order(OrderTransition {
                order: &stale,
                expected,
                event: &events[0],
                actor: admin().id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(h.services.ledger.current_quantity(&admin(), a).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn orders_filter_by_status() {
        let h = harness();
        let (first, _, _) = widget_order(&h).await;
        let a = h.product("C", 100, 0).await;
        let second = h
            .services
            .purchasing
            .create_order(
                &admin(),
                NewOrder {
                    supplier_id: first.supplier_id(),
                    order_date: None,
                    expected_delivery: None,
                    items: vec![item(a.id, 1, None)],
                },
            )
            .await
            .unwrap();
        h.services
            .purchasing
            .transition(&admin(), second.id_typed(), OrderAction::Cancel)
            .await
            .unwrap();

        let cancelled = h
            .services
            .purchasing
            .list_orders(
                &admin(),
                OrderFilter {
                    status: Some(OrderStatus::Cancelled),
                    supplier_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id_typed(), second.id_typed());
        assert_eq!(
            h.services.purchasing.list_orders(&admin(), OrderFilter::default()).await.unwrap().len(),
            2
        );
    }
}
