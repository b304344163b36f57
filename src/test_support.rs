//! Fixtures shared by the binary's unit tests

use crate::middleware::rate_limit::RateLimitLayer;
use crate::server::config::AppConfig;
use crate::server::{build_router, AppState};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const PASSWORD: &str = "correct horse";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some("unit-test-secret".to_string());
    config.auth.password_hash = Some(bcrypt::hash(PASSWORD, 4).unwrap());
    config.executor.working_directory = Some(std::env::temp_dir());
    // Tests address clients through X-Forwarded-For
    config.server.trust_proxy_headers = true;
    config
}

pub fn test_state(config: &AppConfig) -> Arc<AppState> {
    Arc::new(AppState::from_config(config, "test".to_string()).unwrap())
}

pub fn test_router(config: &AppConfig, state: Arc<AppState>) -> Router {
    let limiter = RateLimitLayer::new(
        config.security.auth_endpoint_policy(),
        config.server.trust_proxy_headers,
    );
    build_router(state, limiter, CorsLayer::permissive())
}
