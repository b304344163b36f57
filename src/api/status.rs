//! Operator status endpoint (`GET /status`, bearer token required)

use crate::middleware::auth::RequireToken;
use crate::middleware::client_addr::ClientAddr;
use crate::server::AppState;
use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use shellgate_core::SessionStats;
use std::net::IpAddr;
use std::sync::Arc;

/// Page size assumed when converting `/proc/self/statm` pages to bytes.
const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub server: &'static str,
    /// Seconds since startup
    pub uptime: f64,
    pub memory: MemoryUsage,
    pub sessions: SessionStats,
    pub environment: String,
    pub ip_lockout: IpLockout,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Resident set size in bytes; absent off Linux
    pub rss: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpLockout {
    #[serde(rename = "yourIP")]
    pub your_ip: IpAddr,
    pub attempts: u32,
    pub is_locked: bool,
    pub remaining_attempts: u32,
}

async fn status(
    RequireToken(_claims): RequireToken,
    Extension(state): Extension<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        server: "healthy",
        uptime: state.uptime().as_secs_f64(),
        memory: MemoryUsage {
            rss: resident_set_size().await,
        },
        sessions: state.sessions.stats(),
        environment: state.environment.clone(),
        ip_lockout: IpLockout {
            your_ip: addr,
            attempts: state.guard.attempts(addr),
            is_locked: state.guard.is_locked(addr),
            remaining_attempts: state.guard.remaining_attempts(addr),
        },
    })
}

async fn resident_set_size() -> Option<u64> {
    let statm = tokio::fs::read_to_string("/proc/self/statm").await.ok()?;
    parse_statm_rss(&statm)
}

/// Second field of statm is resident pages.
fn parse_statm_rss(statm: &str) -> Option<u64> {
    statm
        .split_whitespace()
        .nth(1)?
        .parse::<u64>()
        .ok()
        .map(|pages| pages * PAGE_SIZE)
}

pub fn status_routes() -> Router {
    Router::new().route("/status", get(status))
}
