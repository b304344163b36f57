//! HTTP API
//!
//! - `/`, `/health`: public liveness and summary
//! - `/status`: operator status (bearer token)
//! - `/auth/validate`: password check sharing the abuse guard

pub mod auth;
pub mod health;
pub mod status;


use axum::Router;

pub use auth::auth_routes;
pub use health::health_routes;
pub use status::status_routes;

/// Routes without their own middleware
pub fn routes() -> Router {
    Router::new().merge(health_routes()).merge(status_routes())
}
