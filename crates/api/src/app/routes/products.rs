use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use stockroom_catalog::{NewProduct, Product, ProductId, ProductPatch};
use stockroom_infra::Services;

use crate::app::dto::{self, HistoryPageResponse, HistoryQuery, ListProductsQuery, QuantityResponse};
use crate::app::errors::{ApiJson, ApiQuery, ApiResult};
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).patch(update_product))
        .route("/:id/disable", post(disable_product))
        .route("/:id/quantity", get(quantity))
        .route("/:id/movements", get(history))
}

pub async fn create_product(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = services.catalog.create_product(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list_products(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<ListProductsQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let products = services
        .catalog
        .list_products(&principal, query.include_disabled)
        .await?;
    Ok(Json(products))
}

pub async fn get_product(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let id: ProductId = dto::parse_id(&id)?;
    Ok(Json(services.catalog.get_product(&principal, id).await?))
}

pub async fn update_product(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> ApiResult<Json<Product>> {
    let id: ProductId = dto::parse_id(&id)?;
    Ok(Json(services.catalog.update_product(&principal, id, patch).await?))
}

pub async fn disable_product(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let id: ProductId = dto::parse_id(&id)?;
    Ok(Json(services.catalog.disable_product(&principal, id).await?))
}

pub async fn quantity(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<QuantityResponse>> {
    let product_id: ProductId = dto::parse_id(&id)?;
    let quantity = services.ledger.current_quantity(&principal, product_id).await?;
    Ok(Json(QuantityResponse {
        product_id,
        quantity,
    }))
}

pub async fn history(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Json<HistoryPageResponse>> {
    let product_id: ProductId = dto::parse_id(&id)?;
    let (range, page) = query.into_parts()?;
    let page = services
        .ledger
        .history(&principal, product_id, range, page)
        .await?;
    Ok(Json(page.into()))
}
