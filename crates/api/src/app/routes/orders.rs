use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use stockroom_infra::{Services, TransitionOutcome};
use stockroom_purchasing::{NewOrder, OrderAction, OrderId, PurchaseOrder};

use crate::app::dto::{self, ListOrdersQuery};
use crate::app::errors::{ApiJson, ApiQuery, ApiResult};
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/deliver", post(deliver_order))
        .route("/:id/cancel", post(cancel_order))
}

pub async fn create_order(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(body): ApiJson<NewOrder>,
) -> ApiResult<(StatusCode, Json<PurchaseOrder>)> {
    let order = services.purchasing.create_order(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<ListOrdersQuery>,
) -> ApiResult<Json<Vec<PurchaseOrder>>> {
    let filter = query.into_filter()?;
    Ok(Json(services.purchasing.list_orders(&principal, filter).await?))
}

pub async fn get_order(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<PurchaseOrder>> {
    let id: OrderId = dto::parse_id(&id)?;
    Ok(Json(services.purchasing.get_order(&principal, id).await?))
}

pub async fn confirm_order(
    services: Extension<Services>,
    principal: CurrentPrincipal,
    id: Path<String>,
) -> ApiResult<Json<TransitionOutcome>> {
    transition(services, principal, id, OrderAction::Confirm).await
}

pub async fn deliver_order(
    services: Extension<Services>,
    principal: CurrentPrincipal,
    id: Path<String>,
) -> ApiResult<Json<TransitionOutcome>> {
    transition(services, principal, id, OrderAction::Deliver).await
}

pub async fn cancel_order(
    services: Extension<Services>,
    principal: CurrentPrincipal,
    id: Path<String>,
) -> ApiResult<Json<TransitionOutcome>> {
    transition(services, principal, id, OrderAction::Cancel).await
}

async fn transition(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    action: OrderAction,
) -> ApiResult<Json<TransitionOutcome>> {
    let id: OrderId = dto::parse_id(&id)?;
    Ok(Json(services.purchasing.transition(&principal, id, action).await?))
}
