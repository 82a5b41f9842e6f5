use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::{info, instrument};

use stockroom_auth::{authorize, Principal, RoleSet};
use stockroom_catalog::ProductId;
use stockroom_ledger::{
    HistoryPage, HistoryRange, MovementId, NewMovement, PageRequest, StockMovement,
};

use super::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{AppendMovement, Appended, StoreError};

/// The append-only movement log and everything derived from it.
#[derive(Clone)]
pub struct StockLedger {
    ctx: Arc<ServiceContext>,
}

impl StockLedger {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Append one movement on behalf of `principal`.
    ///
    /// The stock policy is enforced by the store against the quantity derived
    /// inside the same transaction. Replaying an idempotency key returns the
    /// original entry ([`Appended::Replayed`]) without appending.
    #[instrument(
        skip(self, principal, input),
        fields(actor = %principal.id, product_id = %input.product_id, kind = %input.kind),
        err
    )]
    pub async fn record_movement(
        &self,
        principal: &Principal,
        input: NewMovement,
    ) -> ServiceResult<Appended> {
        authorize(Some(principal), RoleSet::STOCK_KEEPERS)?;

        let mut movement = input.validated()?;
        // Receipts are only ever produced by order delivery.
        movement.source_order = None;
        let product_id = movement.product_id;

        let appended = self
            .ctx
            .store
            .append_movement(AppendMovement {
                id: MovementId::new(),
                movement,
                actor: principal.id,
                policy: self.ctx.policies.negative_stock,
                require_active: true,
                recorded_at: self.ctx.clock.now(),
            })
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => ServiceError::UnknownProduct(product_id),
                other => other.into(),
            })?;

        let m = appended.movement();
        if appended.is_replay() {
            info!(movement_id = %m.id, product_id = %m.product_id, "movement replayed for idempotency key");
        } else {
            info!(
                movement_id = %m.id,
                product_id = %m.product_id,
                kind = %m.kind,
                quantity = m.quantity,
                sequence = m.sequence,
                "movement recorded"
            );
        }
        Ok(appended)
    }

    /// Signed sum of every movement of the product.
    pub async fn current_quantity(&self, principal: &Principal, product_id: ProductId) -> ServiceResult<i64> {
        authorize(Some(principal), RoleSet::ANY_ROLE)?;
        self.ensure_product(product_id).await?;
        let store = &self.ctx.store;
        Ok(self
            .ctx
            .reads
            .run("quantity_of", || store.quantity_of(product_id))
            .await?)
    }

    /// One page of history, oldest first.
    pub async fn history(
        &self,
        principal: &Principal,
        product_id: ProductId,
        range: HistoryRange,
        page: PageRequest,
    ) -> ServiceResult<HistoryPage> {
        authorize(Some(principal), RoleSet::ANY_ROLE)?;
        self.ensure_product(product_id).await?;
        self.page(product_id, range, page).await
    }

    /// The whole history as a lazy stream, fetched `page_size` entries at a
    /// time. Each page resumes from the previous page's cursor, so entries
    /// appended while streaming do not shift what has been seen.
    pub fn history_stream<'a>(
        &'a self,
        principal: &Principal,
        product_id: ProductId,
        range: HistoryRange,
        page_size: usize,
    ) -> ServiceResult<impl Stream<Item = ServiceResult<StockMovement>> + Send + use<'a>> {
        authorize(Some(principal), RoleSet::ANY_ROLE)?;
        let first = PageRequest::first(page_size)?;

        let pages = stream::try_unfold(Some(first), move |next| async move {
            let Some(page) = next else {
                return Ok(None);
            };
            let HistoryPage { items, next_cursor } = self.page(product_id, range, page).await?;
            let following = next_cursor.map(|cursor| PageRequest {
                cursor: Some(cursor),
                ..page
            });
            Ok::<_, ServiceError>(Some((items, following)))
        });

        Ok(pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
            .try_flatten()
            .boxed())
    }

    /// Newest first across all products.
    pub async fn recent_movements(
        &self,
        principal: &Principal,
        limit: usize,
    ) -> ServiceResult<Vec<StockMovement>> {
        authorize(Some(principal), RoleSet::ANY_ROLE)?;
        let limit = PageRequest::first(limit)?.limit;
        let store = &self.ctx.store;
        Ok(self
            .ctx
            .reads
            .run("recent_movements", || store.recent_movements(limit))
            .await?)
    }

    async fn page(
        &self,
        product_id: ProductId,
        range: HistoryRange,
        page: PageRequest,
    ) -> ServiceResult<HistoryPage> {
        let store = &self.ctx.store;
        Ok(self
            .ctx
            .reads
            .run("history_page", || store.history_page(product_id, range, page))
            .await?)
    }

    async fn ensure_product(&self, product_id: ProductId) -> ServiceResult<()> {
        let store = &self.ctx.store;
        match self
            .ctx
            .reads
            .run("get_product", || store.get_product(product_id))
            .await?
        {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound(format!("product {product_id}"))),
        }
    }
}
