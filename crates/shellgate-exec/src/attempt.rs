//! State shared by the plain and PTY supervisors for one process attempt

use crate::events::{ExecEvent, ExecSink, StreamKind};
use shellgate_core::{ProcessId, ProcessSignal, SessionRegistry};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes read per chunk.
pub(crate) const READ_CHUNK: usize = 4096;

/// How long to keep reading after the child has exited.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Input lines queued for a child before further lines are dropped.
pub(crate) const INPUT_QUEUE: usize = 32;

/// How an attempt ended.
#[derive(Debug)]
pub(crate) enum AttemptEnd {
    /// Process exited on its own
    Exited {
        success: bool,
        exit_code: Option<i32>,
    },
    /// No output within the grace period; re-run under a PTY
    Escalate,
    /// Kill-timeout fired while the attempt was still current
    TimedOut,
    /// Terminated, killed or superseded
    Cancelled,
    /// Waiting on the child failed
    Failed(std::io::Error),
}

/// One supervised process attempt.
pub(crate) struct Attempt<'a> {
    pub conn_id: &'a str,
    pub pid: ProcessId,
    pub sessions: &'a SessionRegistry,
    pub sink: &'a dyn ExecSink,
    pub control: mpsc::UnboundedReceiver<ProcessSignal>,
    pub cancelled: bool,
}

impl Attempt<'_> {
    /// Whether this attempt still owns the session's process slot.
    pub fn is_current(&self) -> bool {
        self.sessions.is_current(self.conn_id, self.pid)
    }

    /// Stream a chunk unless the attempt was cancelled.
    pub fn forward(&self, stream: StreamKind, bytes: &[u8]) -> Option<String> {
        if self.cancelled {
            return None;
        }
        let data = String::from_utf8_lossy(bytes).into_owned();
        self.sink.emit(ExecEvent::Stream {
            stream,
            data: data.clone(),
        });
        Some(data)
    }

    /// Outcome for a child that exited while supervised.
    pub fn finish(&self, status: std::io::Result<std::process::ExitStatus>) -> AttemptEnd {
        match status {
            Ok(_) if self.cancelled || !self.is_current() => AttemptEnd::Cancelled,
            Ok(status) => AttemptEnd::Exited {
                success: status.success(),
                exit_code: status.code(),
            },
            Err(e) => AttemptEnd::Failed(e),
        }
    }

    /// Outcome once the kill-timeout fires. The child is already dead.
    pub fn expired(&self) -> AttemptEnd {
        if self.cancelled || !self.is_current() {
            AttemptEnd::Cancelled
        } else {
            AttemptEnd::TimedOut
        }
    }

    /// Apply a terminate or kill request to `child`.
    pub fn stop(&mut self, child: &mut Child, signal: &ProcessSignal) {
        self.cancelled = true;
        match signal {
            ProcessSignal::Terminate => terminate(child),
            _ => {
                let _ = child.start_kill();
            }
        }
        debug!(conn_id = %self.conn_id, pid = %self.pid, ?signal, "Stop requested");
    }
}

/// Feeds input lines to a child from its own task.
///
/// The supervisor only ever queues, so a child that stops reading its input
/// cannot hold up the deadline, exit detection or stop signals. Dropping the
/// writer aborts the task and closes the child's input.
pub(crate) struct InputWriter {
    lines: Option<mpsc::Sender<String>>,
    task: JoinHandle<()>,
}

impl InputWriter {
    pub fn spawn<W>(mut writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (lines, mut rx) = mpsc::channel::<String>(INPUT_QUEUE);
        let task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Some(lines),
            task,
        }
    }

    /// Queue `text` as one line. Never waits.
    pub fn push(&mut self, conn_id: &str, text: String) {
        let Some(lines) = &self.lines else {
            return;
        };
        match lines.try_send(format!("{text}\n")) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %conn_id, "Process is not reading input, line dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %conn_id, "Process input closed");
                self.lines = None;
            }
        }
    }
}

impl Drop for InputWriter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read one chunk. `None` at end of stream, on error, or when already closed.
pub(crate) async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> Option<usize> {
    let r = reader.as_mut()?;
    match r.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

/// Force the child down and reap it.
pub(crate) async fn kill_and_reap(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Ask the child to exit with SIGTERM.
#[cfg(unix)]
pub(crate) fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id().and_then(|id| i32::try_from(id).ok()) {
        Some(raw) => {
            let _ = kill(Pid::from_raw(raw), Signal::SIGTERM);
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}
