use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{outbound, OutboundRx};
use super::handlers::{ConnectionContext, Flow};
use super::protocol::{ClientEvent, ProtocolViolation};
use crate::server::AppState;

/// Max time without receiving a message before considering the connection dead.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 60;
/// How often to send server-side pings.
pub const PING_INTERVAL_SECS: u64 = 30;

/// Main connection handler: one session per socket, torn down on exit.
pub async fn handle_connection(socket: WebSocket, state: Arc<AppState>, addr: IpAddr) {
    let conn_id = Uuid::new_v4().to_string();
    let cwd = state.runner.config().initial_directory();
    let closed = state.sessions.create(&conn_id, addr, cwd);
    info!(conn_id = %conn_id, ip = %addr, "Gateway connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = outbound();
    let ctx = ConnectionContext {
        conn_id: conn_id.clone(),
        addr,
        state: Arc::clone(&state),
        outbound: out_tx,
    };

    let ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(PING_INTERVAL_SECS));
    tokio::pin!(ping_interval);
    let mut last_recv = tokio::time::Instant::now();
    let heartbeat_timeout = tokio::time::Duration::from_secs(HEARTBEAT_TIMEOUT_SECS);

    loop {
        tokio::select! {
            // Client message
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        violation(&conn_id, addr, &ProtocolViolation::Binary);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_recv = tokio::time::Instant::now();
                        let _ = ws_tx.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_recv = tokio::time::Instant::now();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "Gateway socket error");
                        break;
                    }
                };
                last_recv = tokio::time::Instant::now();

                let event = match ClientEvent::parse(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        violation(&conn_id, addr, &e);
                        break;
                    }
                };

                if ctx.handle(event).await == Flow::Disconnect {
                    flush(&mut ws_tx, &mut out_rx).await;
                    break;
                }
            }
            // Replies and command events
            Some(event) = out_rx.recv() => {
                if ws_tx.send(Message::Text(event.to_frame())).await.is_err() {
                    break;
                }
            }
            // Session deleted (expiry sweep, token rejection, shutdown)
            _ = closed.cancelled() => {
                info!(conn_id = %conn_id, "Session closed, dropping connection");
                flush(&mut ws_tx, &mut out_rx).await;
                break;
            }
            // Server ping (WS protocol level)
            _ = ping_interval.tick() => {
                if last_recv.elapsed() > heartbeat_timeout {
                    info!(conn_id = %conn_id, "Heartbeat timeout, closing");
                    break;
                }
                if ws_tx.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    state.sessions.delete(&conn_id);
    info!(conn_id = %conn_id, ip = %addr, "Gateway connection closed");
}

fn violation(conn_id: &str, addr: IpAddr, e: &ProtocolViolation) {
    warn!(conn_id = %conn_id, ip = %addr, reason = %e, "Protocol violation, disconnecting");
}

/// Deliver whatever is already queued before closing.
async fn flush(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    out_rx: &mut OutboundRx,
) {
    while let Some(event) = out_rx.try_recv() {
        if ws_tx.send(Message::Text(event.to_frame())).await.is_err() {
            return;
        }
    }
}
