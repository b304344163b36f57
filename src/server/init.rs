//! Server initialization
//!
//! Contains the main `run()` function that starts all server components.

use super::config::{AppConfig, ServerConfig};
use super::loader::{environment_name, load_config};
use super::state::AppState;
use super::validation::validate_config;
use crate::middleware::rate_limit::RateLimitLayer;
use crate::{api, websocket};
use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Run the server
pub async fn run() -> Result<()> {
    let environment = environment_name();
    info!(
        environment = %environment,
        "Starting Shellgate v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config()?;
    validate_config(&config)?;

    let state = Arc::new(AppState::from_config(&config, environment)?);
    let shutdown = CancellationToken::new();

    let sweepers = [
        state.guard.spawn_sweeper(shutdown.child_token()),
        state.sessions.spawn_sweeper(shutdown.child_token()),
    ];

    let auth_limiter = RateLimitLayer::new(
        config.security.auth_endpoint_policy(),
        config.server.trust_proxy_headers,
    );
    auth_limiter.spawn_cleanup(shutdown.child_token());

    let app = build_router(Arc::clone(&state), auth_limiter, cors_layer(&config.server));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Gateway listening on http://{} (WebSocket at /ws)", addr);
    log_settings(&config);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown_signal())
    .await
    .context("HTTP server error")?;

    shutdown.cancel();
    for sweeper in sweepers {
        if let Err(e) = sweeper.await {
            warn!("Sweeper task error: {}", e);
        }
    }

    let closed = state.sessions.delete_all();
    info!(sessions = closed, "Shellgate shutdown complete");
    Ok(())
}

/// Assemble routes and layers around shared state
pub fn build_router(state: Arc<AppState>, auth_limiter: RateLimitLayer, cors: CorsLayer) -> Router {
    Router::new()
        .merge(api::routes())
        .merge(api::auth_routes().layer(auth_limiter))
        .merge(websocket::routes())
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

fn log_settings(config: &AppConfig) {
    let guard = &config.security.guard;
    info!(
        max_attempts = guard.max_attempts,
        lockout_secs = guard.lockout_secs,
        guest_window_ms = guard.guest_window_ms,
        guest_max_requests = guard.guest_max_requests,
        guest_ban_secs = guard.guest_ban_secs,
        "Abuse guard configured"
    );
    info!(
        session_timeout_secs = config.sessions.timeout_secs,
        command_timeout_secs = config.executor.command_timeout_secs,
        pty_grace_ms = config.executor.pty_grace_ms,
        guest_commands = config.executor.guest_commands.len(),
        "Executor configured"
    );
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
