use axum::{routing::get, Router};

pub mod admin;
pub mod movements;
pub mod orders;
pub mod products;
pub mod reports;
pub mod suppliers;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/admin", admin::router())
        .nest("/products", products::router())
        .nest("/suppliers", suppliers::router())
        .nest("/movements", movements::router())
        .nest("/orders", orders::router())
        .nest("/reports", reports::router())
}
