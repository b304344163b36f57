//! Handle to the process a session is running
//!
//! The registry only stores the handle; the task supervising the child owns
//! the receiving end of the control channel and acts on the signals.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one process attempt. A PTY re-run gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProcessId(u64);

impl ProcessId {
    fn next() -> Self {
        Self(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for logging.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the process is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// Piped stdin/stdout/stderr
    Plain,
    /// Pseudo-terminal
    Pty,
}

/// Instructions delivered to the supervising task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Write to the process input
    Input(String),
    /// Ask the process to exit (SIGTERM)
    Terminate,
    /// Force the process down (SIGKILL)
    Kill,
}

/// Registry-side handle to a running process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: ProcessId,
    mode: ProcessMode,
    control: mpsc::UnboundedSender<ProcessSignal>,
}

impl ProcessHandle {
    /// New handle with a fresh id, plus the receiver for the supervisor.
    pub fn new(mode: ProcessMode) -> (Self, mpsc::UnboundedReceiver<ProcessSignal>) {
        let (control, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ProcessId::next(),
                mode,
                control,
            },
            rx,
        )
    }

    /// Attempt identity
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Attachment mode
    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    /// Forward `text` to the process input. `false` once the supervisor is gone.
    pub fn send_input(&self, text: impl Into<String>) -> bool {
        self.control.send(ProcessSignal::Input(text.into())).is_ok()
    }

    /// Request a graceful exit.
    pub fn terminate(&self) -> bool {
        self.control.send(ProcessSignal::Terminate).is_ok()
    }

    /// Force the process down.
    pub fn kill(&self) -> bool {
        self.control.send(ProcessSignal::Kill).is_ok()
    }

    /// Whether the supervising task still listens.
    pub fn is_alive(&self) -> bool {
        !self.control.is_closed()
    }
}
