use axum::{
    extract::{Extension, Path},
    routing::put,
    Json, Router,
};

use stockroom_core::UserId;
use stockroom_infra::Services;

use crate::app::dto::{self, AssignRoleRequest, RoleAssigned};
use crate::app::errors::{ApiJson, ApiResult};
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new().route("/users/:id/role", put(assign_role))
}

pub async fn assign_role(
    Extension(services): Extension<Services>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignRoleRequest>,
) -> ApiResult<Json<RoleAssigned>> {
    let user: UserId = dto::parse_id(&id)?;
    services.roles.assign_role(&principal, user, body.role).await?;
    Ok(Json(RoleAssigned {
        user_id: user,
        role: body.role,
    }))
}
