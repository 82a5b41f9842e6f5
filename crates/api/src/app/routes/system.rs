use axum::{http::StatusCode, Json};

use crate::app::dto::WhoAmI;
use crate::context::CurrentPrincipal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(CurrentPrincipal(principal): CurrentPrincipal) -> Json<WhoAmI> {
    Json(principal.into())
}
