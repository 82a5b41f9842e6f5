use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

use stockroom_infra::{ServiceError, Services};
use stockroom_ledger::{NewMovement, StockMovement};

use crate::app::dto::{RecentQuery, DEFAULT_RECENT_LIMIT};
use crate::app::errors::{ApiJson, ApiQuery, ApiResult};
use crate::context::CurrentPrincipal;

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_movement))
        .route("/recent", get(recent_movements))
}

/// 201 for a new entry, 200 when an idempotency key replays an earlier one.
pub async fn record_movement(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    headers: HeaderMap,
    ApiJson(mut body): ApiJson<NewMovement>,
) -> ApiResult<(StatusCode, Json<StockMovement>)> {
    if let Some(value) = headers.get(IDEMPOTENCY_KEY) {
        let key = value
            .to_str()
            .map_err(|_| ServiceError::Validation("idempotency key must be visible ASCII".to_string()))?;
        body.idempotency_key = Some(key.to_string());
    }

    let appended = services.ledger.record_movement(&principal, body).await?;
    let status = if appended.is_replay() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(appended.into_movement())))
}

pub async fn recent_movements(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<RecentQuery>,
) -> ApiResult<Json<Vec<StockMovement>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(services.ledger.recent_movements(&principal, limit).await?))
}
