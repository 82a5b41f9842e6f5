use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use stockroom_auth::Principal;
use stockroom_infra::ServiceError;

use crate::app::errors::ApiError;

/// The caller resolved by [`auth_middleware`](crate::middleware::auth_middleware).
///
/// Protected handlers take this as an argument; it is immutable for the
/// lifetime of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(CurrentPrincipal)
            .ok_or(ApiError(ServiceError::Unauthenticated))
    }
}
