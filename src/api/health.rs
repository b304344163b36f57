//! Liveness endpoints
//!
//! - `/health`: "healthy" + version (for load balancers)
//! - `/`: public summary of sessions and blocked addresses

use crate::middleware::client_addr::ClientAddr;
use crate::server::AppState;
use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shellgate_core::SessionStats;
use std::net::IpAddr;
use std::sync::Arc;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Public summary served at `/`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub sessions: SessionStats,
    #[serde(rename = "blockedIPs")]
    pub blocked_ips: usize,
    #[serde(rename = "yourIP")]
    pub your_ip: IpAddr,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn summary(
    Extension(state): Extension<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
) -> Json<SummaryResponse> {
    Json(SummaryResponse {
        status: "Shellgate Server Running",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        sessions: state.sessions.stats(),
        blocked_ips: state.guard.locked_count(),
        your_ip: addr,
    })
}

pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(summary))
        .route("/health", get(health))
}
