use axum::{extract::Extension, routing::get, Json, Router};

use stockroom_infra::Services;
use stockroom_reporting::{DashboardMetrics, LowStockEntry, SeriesPoint, SpendReport, ValuationReport};

use crate::app::dto::SeriesQuery;
use crate::app::errors::{ApiQuery, ApiResult};
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/low-stock", get(low_stock))
        .route("/valuation", get(valuation))
        .route("/movements", get(movement_series))
        .route("/supplier-spend", get(supplier_spend))
        .route("/dashboard", get(dashboard))
}

pub async fn low_stock(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<LowStockEntry>>> {
    Ok(Json(services.reporting.low_stock(&principal).await?))
}

pub async fn valuation(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<ValuationReport>> {
    Ok(Json(services.reporting.valuation(&principal).await?))
}

pub async fn movement_series(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<SeriesQuery>,
) -> ApiResult<Json<Vec<SeriesPoint>>> {
    let series = services
        .reporting
        .movement_series(&principal, query.from, query.to)
        .await?;
    Ok(Json(series))
}

pub async fn supplier_spend(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<SpendReport>> {
    Ok(Json(services.reporting.supplier_spend(&principal).await?))
}

pub async fn dashboard(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<DashboardMetrics>> {
    Ok(Json(services.reporting.dashboard(&principal).await?))
}
