use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use stockroom_auth::{authorize, Principal, RoleSet};
use stockroom_ledger::HistoryRange;
use stockroom_purchasing::OrderFilter;
use stockroom_reporting::{
    dashboard_metrics, low_stock, movement_series, supplier_spend, valuation, DashboardMetrics,
    LowStockEntry, SeriesPoint, SeriesWindow, SpendReport, ValuationReport, ACTIVITY_WINDOW_DAYS,
};

use super::ServiceContext;
use crate::error::ServiceResult;

/// Read-only aggregation. Everything is recomputed from the store on each
/// call; nothing is cached.
#[derive(Clone)]
pub struct ReportingView {
    ctx: Arc<ServiceContext>,
}

impl ReportingView {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn low_stock(&self, principal: &Principal) -> ServiceResult<Vec<LowStockEntry>> {
        authorize(Some(principal), RoleSet::REPORT_READERS)?;
        let store = &self.ctx.store;
        let products = self.ctx.reads.run("list_products", || store.list_products(false)).await?;
        let levels = self.ctx.reads.run("stock_levels", || store.stock_levels()).await?;
        Ok(low_stock(&products, &levels))
    }

    pub async fn valuation(&self, principal: &Principal) -> ServiceResult<ValuationReport> {
        authorize(Some(principal), RoleSet::REPORT_READERS)?;
        let store = &self.ctx.store;
        let products = self.ctx.reads.run("list_products", || store.list_products(true)).await?;
        let levels = self.ctx.reads.run("stock_levels", || store.stock_levels()).await?;
        Ok(valuation(&products, &levels)?)
    }

    /// Daily in/out/adjustment totals. Without bounds, the last
    /// [`ACTIVITY_WINDOW_DAYS`] days up to today.
    pub async fn movement_series(
        &self,
        principal: &Principal,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<Vec<SeriesPoint>> {
        authorize(Some(principal), RoleSet::REPORT_READERS)?;

        let today = self.ctx.clock.now().date_naive();
        let max_days = self.ctx.policies.max_series_days;
        let window = match (from, to) {
            (None, None) => SeriesWindow::trailing(today, ACTIVITY_WINDOW_DAYS as u32)?,
            (Some(from), None) => SeriesWindow::new(from, today.max(from), max_days)?,
            (None, Some(to)) => SeriesWindow::trailing(to, ACTIVITY_WINDOW_DAYS as u32)?,
            (Some(from), Some(to)) => SeriesWindow::new(from, to, max_days)?,
        };

        let (start, end) = window.bounds();
        let range = HistoryRange::new(Some(start), end)?;
        let store = &self.ctx.store;
        let movements = self.ctx.reads.run("movements_in", || store.movements_in(range)).await?;
        Ok(movement_series(&movements, window))
    }

    pub async fn supplier_spend(&self, principal: &Principal) -> ServiceResult<SpendReport> {
        authorize(Some(principal), RoleSet::REPORT_READERS)?;
        let store = &self.ctx.store;
        let suppliers = self.ctx.reads.run("list_suppliers", || store.list_suppliers()).await?;
        let orders = self
            .ctx
            .reads
            .run("list_orders", || store.list_orders(OrderFilter::default()))
            .await?;
        Ok(supplier_spend(&suppliers, &orders)?)
    }

    pub async fn dashboard(&self, principal: &Principal) -> ServiceResult<DashboardMetrics> {
        authorize(Some(principal), RoleSet::REPORT_READERS)?;
        let store = &self.ctx.store;
        let since = self.ctx.clock.now() - Duration::days(ACTIVITY_WINDOW_DAYS);

        let products = self.ctx.reads.run("list_products", || store.list_products(false)).await?;
        let levels = self.ctx.reads.run("stock_levels", || store.stock_levels()).await?;
        let recent = self
            .ctx
            .reads
            .run("count_movements_since", || store.count_movements_since(since))
            .await?;
        let orders = self
            .ctx
            .reads
            .run("list_orders", || store.list_orders(OrderFilter::default()))
            .await?;
        Ok(dashboard_metrics(&products, &levels, recent, &orders))
    }
}

#[cfg(test)]
mod tests {
    use stockroom_auth::Role;
    use stockroom_core::{ErrorKind, Money};
    use stockroom_ledger::{MovementKind, NewMovement};
    use stockroom_purchasing::{NewOrder, NewOrderItem, OrderAction};

    use super::*;
    use crate::services::testing::{admin, harness, principal};

    #[tokio::test]
    async fn reports_follow_the_ledger() {
        let h = harness();
        let a = h.product("A", 200, 10).await;
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
                    items: vec![
                        NewOrderItem { product_id: a.id, quantity: 10, unit_price: None },
                        NewOrderItem { product_id: b.id, quantity: 5, unit_price: None },
                    ],
                },
            )
            .await
            .unwrap();

        let viewer = principal(Role::Viewer);
        let reports = &h.services.reporting;

        let dash = reports.dashboard(&viewer).await.unwrap();
        assert_eq!(dash.total_products, 2);
        assert_eq!(dash.pending_orders, 1);
        assert_eq!(dash.low_stock_products, 1);
        assert_eq!(dash.movements_last_30_days, 0);

        let engine = &h.services.purchasing;
        engine.transition(&admin(), order.id_typed(), OrderAction::Confirm).await.unwrap();
        engine.transition(&admin(), order.id_typed(), OrderAction::Deliver).await.unwrap();
        h.services
            .ledger
            .record_movement(&admin(), NewMovement::new(a.id, MovementKind::StockOut, 1))
            .await
            .unwrap();

        let low = reports.low_stock(&viewer).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!((low[0].product_id, low[0].on_hand, low[0].shortfall), (a.id, 9, 1));

        let value = reports.valuation(&viewer).await.unwrap();
        assert_eq!(value.total_value, Money::from_cents(9 * 200 + 5 * 300));

        let spend = reports.supplier_spend(&viewer).await.unwrap();
        assert_eq!(spend.total_spent, Money::from_cents(3500));
        assert_eq!(spend.suppliers[0].delivered, 1);

        let series = reports.movement_series(&viewer, None, None).await.unwrap();
        assert_eq!(series.len(), 30);
        let today = series.last().unwrap();
        assert_eq!((today.stock_in, today.stock_out), (15, 1));

        let dash = reports.dashboard(&viewer).await.unwrap();
        assert_eq!(dash.movements_last_30_days, 3);
        assert_eq!(dash.pending_orders, 0);
    }

    #[tokio::test]
    async fn series_window_is_bounded() {
        let h = harness();
        let reports = &h.services.reporting;
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();

        let err = reports
            .movement_series(&admin(), Some(day(10)), Some(day(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let far = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let err = reports
            .movement_series(&admin(), Some(day(1)), Some(far))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let ok = reports.movement_series(&admin(), Some(day(1)), Some(day(7))).await.unwrap();
        assert_eq!(ok.len(), 7);
    }

    #[tokio::test]
    async fn stock_controllers_cannot_read_reports() {
        let h = harness();
        let err = h
            .services
            .reporting
            .dashboard(&principal(Role::StockController))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
