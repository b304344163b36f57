//! Password validation endpoint (`POST /auth/validate`)
//!
//! Shares lockout state with the WebSocket authenticate flow.

use crate::middleware::client_addr::ClientAddr;
use crate::server::AppState;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Missing counts as a wrong password
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

async fn validate(
    Extension(state): Extension<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
    Json(request): Json<ValidateRequest>,
) -> Response {
    if state.guard.is_locked(addr) {
        warn!(ip = %addr, "Password validation refused: address locked");
        let body = ValidateResponse {
            valid: false,
            message: "IP Lockdown enabled",
            lockout: Some(true),
            remaining_attempts: None,
        };
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }

    if state.authority.check_password(request.password).await {
        state.guard.clear(addr);
        info!(ip = %addr, "Password validated over HTTP");
        let body = ValidateResponse {
            valid: true,
            message: "AUTH OK",
            lockout: None,
            remaining_attempts: None,
        };
        return (StatusCode::OK, Json(body)).into_response();
    }

    state.guard.record_failure(addr);
    let body = ValidateResponse {
        valid: false,
        message: "WRONG PASSWORD",
        lockout: None,
        remaining_attempts: Some(state.guard.remaining_attempts(addr)),
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

pub fn auth_routes() -> Router {
    Router::new().route("/auth/validate", post(validate))
}
