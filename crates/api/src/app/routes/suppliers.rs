use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use stockroom_catalog::{NewSupplier, Supplier, SupplierId};
use stockroom_infra::Services;

use crate::app::dto;
use crate::app::errors::{ApiJson, ApiResult};
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_supplier).get(list_suppliers))
        .route("/:id", get(get_supplier).delete(delete_supplier))
}

pub async fn create_supplier(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewSupplier>,
) -> ApiResult<(StatusCode, Json<Supplier>)> {
    let supplier = services.catalog.create_supplier(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn list_suppliers(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Vec<Supplier>>> {
    Ok(Json(services.catalog.list_suppliers(&principal).await?))
}

pub async fn get_supplier(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Supplier>> {
    let id: SupplierId = dto::parse_id(&id)?;
    Ok(Json(services.catalog.get_supplier(&principal, id).await?))
}

pub async fn delete_supplier(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: SupplierId = dto::parse_id(&id)?;
    services.catalog.delete_supplier(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
