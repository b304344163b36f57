//! Runner events → gateway frames
//!
//! Each connection has one ordered outbound queue. Output chunks draw on a
//! fixed budget; chunks past it are dropped and the client is told how many
//! before the next frame that does get through.

use super::protocol::ServerEvent;
use shellgate_exec::{ExecEvent, ExecSink, StreamKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

/// Output chunks a connection may have queued before new ones are dropped.
pub const STREAM_BUDGET: usize = 256;

struct StreamBudget {
    limit: usize,
    queued: AtomicUsize,
    dropped: AtomicUsize,
}

/// Sending half of a connection's outbound queue.
#[derive(Clone)]
pub struct Outbound {
    tx: UnboundedSender<ServerEvent>,
    budget: Arc<StreamBudget>,
}

/// Receiving half, owned by the connection loop.
pub struct OutboundRx {
    rx: UnboundedReceiver<ServerEvent>,
    budget: Arc<StreamBudget>,
}

pub fn outbound() -> (Outbound, OutboundRx) {
    outbound_with_budget(STREAM_BUDGET)
}

pub fn outbound_with_budget(limit: usize) -> (Outbound, OutboundRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let budget = Arc::new(StreamBudget {
        limit,
        queued: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
    });
    (
        Outbound {
            tx,
            budget: Arc::clone(&budget),
        },
        OutboundRx { rx, budget },
    )
}

impl Outbound {
    /// Queue `event`. Returns false if it was dropped or the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        if is_chunk(&event) {
            let queued = self.budget.queued.fetch_add(1, Ordering::AcqRel);
            if queued >= self.budget.limit {
                self.budget.queued.fetch_sub(1, Ordering::AcqRel);
                if self.budget.dropped.fetch_add(1, Ordering::AcqRel) == 0 {
                    warn!("Client is not keeping up, dropping output");
                }
                return false;
            }
        }
        self.report_dropped();
        self.tx.send(event).is_ok()
    }

    fn report_dropped(&self) {
        let dropped = self.budget.dropped.swap(0, Ordering::AcqRel);
        if dropped == 0 {
            return;
        }
        self.budget.queued.fetch_add(1, Ordering::AcqRel);
        let _ = self.tx.send(ServerEvent::CommandStream {
            stream: StreamKind::Stderr,
            data: format!("\r\n[{dropped} output chunks dropped, client is not keeping up]\r\n"),
        });
    }
}

impl OutboundRx {
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        let event = self.rx.recv().await?;
        self.release(&event);
        Some(event)
    }

    /// Next already-queued event, without waiting.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        let event = self.rx.try_recv().ok()?;
        self.release(&event);
        Some(event)
    }

    fn release(&self, event: &ServerEvent) {
        if is_chunk(event) {
            self.budget.queued.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

fn is_chunk(event: &ServerEvent) -> bool {
    matches!(event, ServerEvent::CommandStream { .. })
}

/// Forwards a command's events onto its connection's outbound queue.
pub struct ConnectionSink {
    outbound: Outbound,
}

impl ConnectionSink {
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

impl ExecSink for ConnectionSink {
    fn emit(&self, event: ExecEvent) {
        // Closed queue: the connection is gone and the session teardown kills the process.
        self.outbound.send(convert_event(event));
    }
}

pub fn convert_event(event: ExecEvent) -> ServerEvent {
    match event {
        ExecEvent::Stream { stream, data } => ServerEvent::CommandStream { stream, data },
        ExecEvent::PtyStarted => ServerEvent::PtySessionStarted {},
        ExecEvent::PtyInputReady => ServerEvent::PtyInputReady {},
        ExecEvent::Complete {
            success,
            exit_code,
            cwd,
        } => ServerEvent::CommandComplete {
            success,
            exit_code,
            current_directory: cwd.display().to_string(),
        },
    }
}
