//! Bearer token middleware for Axum
//!
//! `RequireToken` verifies `Authorization: Bearer <token>` against the
//! CredentialAuthority (signature, issuer, expiry).

use crate::server::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shellgate_core::TokenClaims;
use std::sync::Arc;
use tracing::debug;

/// JSON error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
    code: String,
}

/// Auth rejection type
pub struct AuthRejection {
    status: StatusCode,
    body: AuthErrorResponse,
}

impl AuthRejection {
    fn new(status: StatusCode, error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            body: AuthErrorResponse {
                success: false,
                error: error.into(),
                code: code.into(),
            },
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Axum extractor that requires a valid bearer token.
pub struct RequireToken(pub TokenClaims);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireToken
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts.extensions.get::<Arc<AppState>>().ok_or_else(|| {
            AuthRejection::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authority not configured",
                "INTERNAL_ERROR",
            )
        })?;

        let token = bearer_token(parts).ok_or_else(|| {
            AuthRejection::new(StatusCode::UNAUTHORIZED, "No token provided", "UNAUTHORIZED")
        })?;

        let claims = state.authority.verify_token(token).map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            AuthRejection::new(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token",
                "INVALID_TOKEN",
            )
        })?;

        Ok(RequireToken(claims))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
