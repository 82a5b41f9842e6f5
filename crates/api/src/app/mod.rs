//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: query/request DTOs and response shapes
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use stockroom_auth::{Hs256JwtValidator, IdentityProvider, TokenIdentityProvider};
use stockroom_infra::{Services, Settings};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Everything the router needs.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(services: Services, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { services, identity }
    }

    /// HS256 bearer tokens, roles looked up in the services' own store.
    pub fn with_jwt_secret(services: Services, secret: &str) -> Self {
        let identity = TokenIdentityProvider::new(
            Hs256JwtValidator::new(secret.as_bytes()),
            services.role_directory(),
        );
        Self::new(services, Arc::new(identity))
    }

    pub fn from_settings(services: Services, settings: &Settings) -> Self {
        Self::with_jwt_secret(services, &settings.auth.secret())
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let auth_state = middleware::AuthState {
        identity: state.identity.clone(),
    };

    let protected = routes::router()
        .layer(Extension(state.services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
