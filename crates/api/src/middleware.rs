use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use stockroom_auth::{require_principal, IdentityProvider, RequestContext};
use stockroom_infra::{ServiceError, StoreError};

use crate::app::errors::ApiError;

#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<dyn IdentityProvider>,
}

/// Resolves the bearer token into a [`Principal`](stockroom_auth::Principal)
/// and stores it in the request extensions.
///
/// No token, or one that fails verification, is a 401. A principal without
/// a role is let through; the service gate turns it into a 403.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Response {
    let ctx = RequestContext {
        bearer_token: extract_bearer(req.headers()).map(str::to_string),
    };

    let resolved = match state.identity.resolve_principal(&ctx).await {
        Ok(resolved) => resolved,
        Err(e) => {
            error!(error = %e, "principal resolution failed");
            return ApiError(ServiceError::Storage(StoreError::Backend(e.to_string())))
                .into_response();
        }
    };
    // Audits the anonymous request before it is turned away.
    let principal = match require_principal(resolved) {
        Ok(principal) => principal,
        Err(e) => return ApiError(e.into()).into_response(),
    };

    req.extensions_mut().insert(principal);
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}
