//! Events emitted while a command runs

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Standard output (and all PTY output)
    Stdout,
    /// Standard error
    Stderr,
}

/// Progress of one command, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    /// A chunk of output
    Stream {
        /// Source stream
        stream: StreamKind,
        /// Chunk, lossily decoded as UTF-8
        data: String,
    },
    /// The command was re-run under a pseudo-terminal
    PtyStarted,
    /// A PTY chunk ended with something that looks like a prompt
    PtyInputReady,
    /// The process exited on its own
    Complete {
        /// Exit status was zero
        success: bool,
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Session working directory at completion
        cwd: PathBuf,
    },
}

/// Receiver of [`ExecEvent`]s for one connection.
pub trait ExecSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: ExecEvent);
}

impl ExecSink for mpsc::UnboundedSender<ExecEvent> {
    fn emit(&self, event: ExecEvent) {
        // Receiver gone means the connection closed; the process is torn down separately.
        let _ = self.send(event);
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ExecEvent>>,
}

impl RecordingSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<ExecEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Concatenated output of one stream.
    pub fn output(&self, kind: StreamKind) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExecEvent::Stream { stream, data } if stream == kind => Some(data),
                _ => None,
            })
            .collect()
    }
}

impl ExecSink for RecordingSink {
    fn emit(&self, event: ExecEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
