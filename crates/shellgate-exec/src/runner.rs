//! Command runner
//!
//! `validating → (builtin | spawning) → streaming → (completed |
//! escalated → streaming → completed) | cancelled | timed-out | error`

use crate::attempt::{Attempt, AttemptEnd};
use crate::builtin;
use crate::command::{Builtin, CommandLine};
use crate::config::ExecConfig;
use crate::error::{ExecError, Result};
use crate::events::{ExecEvent, ExecSink};
use crate::{plain, pty};
use shellgate_core::{evaluate, ProcessHandle, ProcessId, ProcessMode, SessionRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a command finished, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// A builtin ran; `output` is shown to the caller
    Builtin {
        /// Message for the caller
        output: String,
    },
    /// The process exited; a completion event was emitted
    Completed {
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
    },
    /// Cancelled or superseded; nothing further was emitted
    Cancelled,
}

/// Runs commands for sessions in a [`SessionRegistry`].
#[derive(Debug, Clone)]
pub struct CommandRunner {
    config: Arc<ExecConfig>,
    sessions: Arc<SessionRegistry>,
}

impl CommandRunner {
    /// Create a runner bound to `sessions`.
    pub fn new(config: ExecConfig, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
        }
    }

    /// Runner settings
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Validate and run `raw` for `conn_id`, streaming to `sink`.
    ///
    /// Resolves when the command is finished for good: exited, cancelled,
    /// timed out or refused. At most one process per session is in flight.
    pub async fn execute(
        &self,
        conn_id: &str,
        raw: &str,
        authenticated: bool,
        sink: Arc<dyn ExecSink>,
    ) -> Result<ExecOutcome> {
        let line = CommandLine::new(raw, self.config.max_command_length);
        if line.is_empty() {
            return Err(ExecError::Denied {
                reason: "empty command".to_string(),
            });
        }

        let verdict = evaluate(
            line.as_str(),
            authenticated,
            &self.config.guest_commands,
            self.config.max_command_length,
        );
        if !verdict.is_allowed() {
            warn!(conn_id = %conn_id, command = %line.as_str(), ?verdict, "Command refused by policy");
            return Err(ExecError::denied(&verdict));
        }

        let cwd = self
            .sessions
            .directory(conn_id)
            .ok_or(ExecError::SessionNotFound)?;

        if let Some(Builtin::ChangeDirectory(target)) = line.builtin() {
            let dir = builtin::change_directory(&cwd, target.as_deref(), &self.config.home)
                .await
                .map_err(ExecError::Builtin)?;
            self.sessions.set_directory(conn_id, &dir)?;
            debug!(conn_id = %conn_id, cwd = %dir.display(), "Directory changed");
            return Ok(ExecOutcome::Builtin {
                output: format!("Changed directory to: {}", dir.display()),
            });
        }

        let (handle, control) = ProcessHandle::new(ProcessMode::Plain);
        let pid = handle.id();
        self.sessions.attach_process(conn_id, handle)?;
        info!(conn_id = %conn_id, pid = %pid, command = %line.as_str(), authenticated, "Executing command");

        let child = match plain::spawn(&line, &cwd, &self.config, authenticated) {
            Ok(child) => child,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Plain spawn failed, retrying under PTY");
                return self.run_pty(conn_id, &line, cwd, pid, authenticated, sink).await;
            }
        };

        let attempt = Attempt {
            conn_id,
            pid,
            sessions: &self.sessions,
            sink: sink.as_ref(),
            control,
            cancelled: false,
        };
        let end = plain::supervise(child, attempt, self.config.timeout(), self.config.grace()).await;

        match end {
            AttemptEnd::Escalate => {
                self.run_pty(conn_id, &line, cwd, pid, authenticated, sink)
                    .await
            }
            end => self.settle(conn_id, pid, end, sink.as_ref()),
        }
    }

    /// Re-run `line` under a PTY, taking over the slot held by `previous`.
    async fn run_pty(
        &self,
        conn_id: &str,
        line: &CommandLine,
        cwd: PathBuf,
        previous: ProcessId,
        authenticated: bool,
        sink: Arc<dyn ExecSink>,
    ) -> Result<ExecOutcome> {
        let (handle, control) = ProcessHandle::new(ProcessMode::Pty);
        let pid = handle.id();
        if !self.sessions.replace_process(conn_id, previous, handle) {
            debug!(conn_id = %conn_id, "Superseded before PTY re-run");
            return Ok(ExecOutcome::Cancelled);
        }

        let (child, pty) = match pty::spawn(line, &cwd, &self.config, authenticated) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.sessions.release_process(conn_id, pid);
                warn!(conn_id = %conn_id, error = %e, "PTY spawn failed");
                return Err(ExecError::SpawnFailed(e.to_string()));
            }
        };

        info!(conn_id = %conn_id, pid = %pid, "PTY session started");
        sink.emit(ExecEvent::PtyStarted);

        let attempt = Attempt {
            conn_id,
            pid,
            sessions: &self.sessions,
            sink: sink.as_ref(),
            control,
            cancelled: false,
        };
        let end = pty::supervise(child, pty, attempt, self.config.timeout()).await;
        self.settle(conn_id, pid, end, sink.as_ref())
    }

    /// Release the slot and turn a finished attempt into the caller's result.
    fn settle(
        &self,
        conn_id: &str,
        pid: ProcessId,
        end: AttemptEnd,
        sink: &dyn ExecSink,
    ) -> Result<ExecOutcome> {
        let owned = self.sessions.release_process(conn_id, pid);
        match end {
            AttemptEnd::Exited { success, exit_code } if owned => {
                let cwd = self.sessions.directory(conn_id).unwrap_or_default();
                info!(conn_id = %conn_id, pid = %pid, ?exit_code, "Command completed");
                sink.emit(ExecEvent::Complete {
                    success,
                    exit_code,
                    cwd,
                });
                Ok(ExecOutcome::Completed { exit_code })
            }
            AttemptEnd::TimedOut if owned => {
                warn!(conn_id = %conn_id, pid = %pid, "Command timed out");
                Err(ExecError::Timeout(self.config.command_timeout_secs))
            }
            AttemptEnd::Failed(e) => Err(ExecError::Io(e)),
            _ => Ok(ExecOutcome::Cancelled),
        }
    }

    /// Terminate the session's process and clear the slot. `false` when idle.
    pub fn cancel(&self, conn_id: &str) -> bool {
        match self.sessions.take_process(conn_id) {
            Some(process) => {
                info!(conn_id = %conn_id, pid = %process.id(), "Cancelling command");
                process.terminate();
                true
            }
            None => false,
        }
    }

    /// Forward a line of input to the session's process. `false` when idle.
    pub fn send_input(&self, conn_id: &str, text: &str) -> bool {
        self.sessions
            .active_process(conn_id)
            .map(|process| process.send_input(text))
            .unwrap_or(false)
    }
}
