//! Gateway WebSocket endpoint (`GET /ws`)
//!
//! Flow:
//! 1. Addresses under a guest ban are refused before upgrade (403)
//! 2. Each socket gets a session (guest tier, initial directory)
//! 3. Text frames carry allow-listed JSON events; anything else disconnects
//! 4. Command output streams back as `command_stream` / `command_complete`

pub mod connection;
pub mod events;
pub mod handlers;
pub mod protocol;
pub mod pseudo;


use crate::middleware::client_addr::ClientAddr;
use crate::server::AppState;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use connection::handle_connection;
use std::sync::Arc;
use tracing::warn;

/// WebSocket upgrade handler for `/ws`.
async fn gateway_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
) -> Response {
    if state.guard.is_banned(addr) {
        warn!(ip = %addr, "Refusing connection from banned address");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let max_bytes = state.max_message_bytes;
    ws.max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| handle_connection(socket, state, addr))
}

pub fn routes() -> Router {
    Router::new().route("/ws", get(gateway_handler))
}
