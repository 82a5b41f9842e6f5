use std::sync::Arc;

use tracing::{info, instrument};

use stockroom_auth::{authorize, Principal, RoleSet};
use stockroom_catalog::{
    NewProduct, NewSupplier, Product, ProductId, ProductPatch, Supplier, SupplierId,
};

use super::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::store::StoreError;

/// Products and suppliers.
#[derive(Clone)]
pub struct ProductCatalog {
    ctx: Arc<ServiceContext>,
}

impl ProductCatalog {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, principal, input), fields(actor = %principal.id, sku = %input.sku), err)]
    pub async fn create_product(
        &self,
        principal: &Principal,
        input: NewProduct,
    ) -> ServiceResult<Product> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        let product = Product::create(ProductId::new(), input, self.ctx.clock.now())?;
        self.ctx
            .store
            .insert_product(&product)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => ServiceError::DuplicateSku(product.sku.clone()),
                other => other.into(),
            })?;

        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    pub async fn get_product(&self, principal: &Principal, id: ProductId) -> ServiceResult<Product> {
        authorize(Some(principal), RoleSet::ANY_ROLE)?;
        self.load_product(id).await
    }

    /// Ordered by SKU; disabled products only on request.
    pub async fn list_products(
        &self,
        principal: &Principal,
        include_disabled: bool,
    ) -> ServiceResult<Vec<Product>> {
        authorize(Some(principal), RoleSet::ANY_ROLE)?;
        let store = &self.ctx.store;
        Ok(self
            .ctx
            .reads
            .run("list_products", || store.list_products(include_disabled))
            .await?)
    }

    #[instrument(skip(self, principal, patch), fields(actor = %principal.id, product_id = %id), err)]
    pub async fn update_product(
        &self,
        principal: &Principal,
        id: ProductId,
        patch: ProductPatch,
    ) -> ServiceResult<Product> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        let mut product = self.load_product(id).await?;
        product.apply_patch(patch, self.ctx.clock.now())?;
        self.ctx.store.update_product(&product).await?;

        info!(product_id = %product.id, sku = %product.sku, "product updated");
        Ok(product)
    }

    /// Soft delete. Refused while the product is on an open order or has
    /// moved within the configured guard window.
    #[instrument(skip(self, principal), fields(actor = %principal.id, product_id = %id), err)]
    pub async fn disable_product(&self, principal: &Principal, id: ProductId) -> ServiceResult<Product> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        let now = self.ctx.clock.now();
        let mut product = self.load_product(id).await?;
        product.disable(now)?;
        self.ctx
            .store
            .disable_product(&product, now - self.ctx.policies.disable_guard)
            .await?;

        info!(product_id = %product.id, sku = %product.sku, "product disabled");
        Ok(product)
    }

    #[instrument(skip(self, principal, input), fields(actor = %principal.id), err)]
    pub async fn create_supplier(
        &self,
        principal: &Principal,
        input: NewSupplier,
    ) -> ServiceResult<Supplier> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        let supplier = Supplier::create(SupplierId::new(), input, self.ctx.clock.now())?;
        self.ctx.store.insert_supplier(&supplier).await?;

        info!(supplier_id = %supplier.id, name = %supplier.name, "supplier created");
        Ok(supplier)
    }

    pub async fn get_supplier(&self, principal: &Principal, id: SupplierId) -> ServiceResult<Supplier> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;
        let store = &self.ctx.store;
        self.ctx
            .reads
            .run("get_supplier", || store.get_supplier(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("supplier {id}")))
    }

    pub async fn list_suppliers(&self, principal: &Principal) -> ServiceResult<Vec<Supplier>> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;
        let store = &self.ctx.store;
        Ok(self
            .ctx
            .reads
            .run("list_suppliers", || store.list_suppliers())
            .await?)
    }

    #[instrument(skip(self, principal), fields(actor = %principal.id, supplier_id = %id), err)]
    pub async fn delete_supplier(&self, principal: &Principal, id: SupplierId) -> ServiceResult<()> {
        authorize(Some(principal), RoleSet::CATALOG_EDITORS)?;

        self.ctx.store.delete_supplier(id).await.map_err(|e| match e {
            StoreError::NotFound(_) => ServiceError::NotFound(format!("supplier {id}")),
            other => other.into(),
        })?;

        info!(supplier_id = %id, "supplier deleted");
        Ok(())
    }

    async fn load_product(&self, id: ProductId) -> ServiceResult<Product> {
        let store = &self.ctx.store;
        self.ctx
            .reads
            .run("get_product", || store.get_product(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use stockroom_auth::Role;
    use stockroom_core::{ErrorKind, Money};
    use stockroom_ledger::{MovementKind, NewMovement};
    use stockroom_purchasing::{NewOrder, NewOrderItem, OrderAction};

    use super::*;
    use crate::services::testing::{admin, harness, new_product, new_supplier, principal};

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let h = harness();
        h.product("WGT-001", 100, 0).await;

        let err = h
            .services
            .catalog
            .create_product(&admin(), new_product("WGT-001", 200, 0))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::DuplicateSku("WGT-001".to_string()));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn only_admins_and_managers_edit_the_catalog() {
        let h = harness();
        for role in [Role::StockController, Role::Viewer] {
            let err = h
                .services
                .catalog
                .create_product(&principal(role), new_product("X-1", 100, 0))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden);
        }
        let manager = principal(Role::Manager);
        assert!(h.services.catalog.create_product(&manager, new_product("X-1", 100, 0)).await.is_ok());

        let no_role = Principal::new(stockroom_core::UserId::new(), None);
        let err = h.services.catalog.list_products(&no_role, false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let h = harness();
        let err = h
            .services
            .catalog
            .create_product(&admin(), new_product("NEG", -1, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn update_keeps_sku_and_bumps_updated_at() {
        let h = harness();
        let p = h.product("WGT-001", 100, 5).await;
        h.clock.advance(Duration::minutes(5));

        let patch = ProductPatch {
            unit_price: Some(Money::from_cents(250)),
            ..ProductPatch::default()
        };
        let updated = h.services.catalog.update_product(&admin(), p.id, patch).await.unwrap();
        assert_eq!(updated.sku, "WGT-001");
        assert_eq!(updated.unit_price, Money::from_cents(250));
        assert!(updated.updated_at > p.updated_at);

        let reread = h.services.catalog.get_product(&principal(Role::Viewer), p.id).await.unwrap();
        assert_eq!(reread, updated);
    }

    #[tokio::test]
    async fn disable_is_guarded_by_recent_movements() {
        let h = harness();
        let p = h.product("WGT-001", 100, 0).await;
        h.services
            .ledger
            .record_movement(&admin(), NewMovement::new(p.id, MovementKind::StockIn, 5))
            .await
            .unwrap();

        let err = h.services.catalog.disable_product(&admin(), p.id).await.unwrap_err();
        assert_eq!(err.code(), "referenced_entity");

        h.clock.advance(Duration::days(31));
        let disabled = h.services.catalog.disable_product(&admin(), p.id).await.unwrap();
        assert!(!disabled.is_active());

        let visible = h.services.catalog.list_products(&admin(), false).await.unwrap();
        assert!(visible.is_empty());
        let all = h.services.catalog.list_products(&admin(), true).await.unwrap();
        assert_eq!(all.len(), 1);

        let again = h.services.catalog.disable_product(&admin(), p.id).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn disable_is_guarded_by_open_orders() {
        let h = harness();
        let p = h.product("WGT-001", 100, 0).await;
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
                    items: vec![NewOrderItem { product_id: p.id, quantity: 1, unit_price: None }],
                },
            )
            .await
            .unwrap();

        let err = h.services.catalog.disable_product(&admin(), p.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Referenced(_)));

        h.services
            .purchasing
            .transition(&admin(), order.id_typed(), OrderAction::Cancel)
            .await
            .unwrap();
        assert!(h.services.catalog.disable_product(&admin(), p.id).await.is_ok());
    }

    #[tokio::test]
    async fn supplier_with_orders_cannot_be_deleted() {
        let h = harness();
        let p = h.product("WGT-001", 100, 0).await;
        let acme = h.supplier("Acme").await;
        let idle = h
            .services
            .catalog
            .create_supplier(&admin(), new_supplier("Idle"))
            .await
            .unwrap();
        h.services
            .purchasing
            .create_order(
                &admin(),
                NewOrder {
                    supplier_id: acme.id,
                    order_date: None,
                    expected_delivery: None,
                    items: vec![NewOrderItem { product_id: p.id, quantity: 1, unit_price: None }],
                },
            )
            .await
            .unwrap();

        let err = h.services.catalog.delete_supplier(&admin(), acme.id).await.unwrap_err();
        assert_eq!(err.code(), "referenced_entity");

        h.services.catalog.delete_supplier(&admin(), idle.id).await.unwrap();
        let err = h.services.catalog.get_supplier(&admin(), idle.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.services.catalog.list_suppliers(&admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn viewers_cannot_see_suppliers() {
        let h = harness();
        let err = h
            .services
            .catalog
            .list_suppliers(&principal(Role::Viewer))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
