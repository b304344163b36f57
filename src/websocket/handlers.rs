//! Per-connection event handlers
//!
//! Every command request goes AbuseGuard → SessionRegistry validation →
//! pseudo-commands → CommandRunner. Replies go onto the connection's
//! outbound queue; the return value says whether to keep the socket.

use super::events::{ConnectionSink, Outbound};
use super::protocol::{ClientEvent, ServerEvent};
use super::pseudo::{help_text, session_text, PseudoCommand};
use crate::server::AppState;
use chrono::Utc;
use shellgate_core::SessionValidation;
use shellgate_exec::{ExecError, ExecOutcome};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Raw commands longer than this are refused before any other check.
pub const MAX_RAW_COMMAND_CHARS: usize = 500;

/// What the connection loop does after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

/// One connection's identity, shared state and outbound queue.
#[derive(Clone)]
pub struct ConnectionContext {
    pub conn_id: String,
    pub addr: IpAddr,
    pub state: Arc<AppState>,
    pub outbound: Outbound,
}

impl ConnectionContext {
    fn send(&self, event: ServerEvent) {
        self.outbound.send(event);
    }

    fn cwd(&self) -> Option<String> {
        self.state
            .sessions
            .directory(&self.conn_id)
            .map(|dir| dir.display().to_string())
    }

    /// Handle one inbound event.
    pub async fn handle(&self, event: ClientEvent) -> Flow {
        if !self.state.sessions.contains(&self.conn_id) {
            warn!(conn_id = %self.conn_id, ip = %self.addr, event = event.name(), "Event for a reaped session");
            return Flow::Disconnect;
        }

        match event {
            ClientEvent::Authenticate { password } => self.authenticate(password).await,
            ClientEvent::ExecuteCommand { command } => self.execute(command),
            ClientEvent::CommandInput { input } => self.input(&input),
            ClientEvent::CancelCommand => self.cancel(),
        }
    }

    // ── authenticate ─────────────────────────────────────────────────────

    async fn authenticate(&self, password: String) -> Flow {
        let guard = &self.state.guard;

        if guard.is_locked(self.addr) {
            warn!(conn_id = %self.conn_id, ip = %self.addr, "Authentication refused: address locked");
            self.send(ServerEvent::AuthFailed {
                error: "Too many failed attempts. Your address is temporarily blocked.".to_string(),
                lockout: true,
                attempts: Some(guard.attempts(self.addr)),
                remaining_attempts: Some(0),
                remaining_time: guard.lockout_info(self.addr).map(|info| info.remaining_ms()),
            });
            return Flow::Continue;
        }

        if !self.state.authority.check_password(password).await {
            let record = guard.record_failure(self.addr);
            let remaining = guard.remaining_attempts(self.addr);

            match guard.lockout_info(self.addr).filter(|info| info.locked) {
                Some(info) => self.send(ServerEvent::AuthFailed {
                    error: format!(
                        "Too many failed attempts. Locked for {} minutes.",
                        info.remaining_minutes()
                    ),
                    lockout: true,
                    attempts: Some(record.attempts),
                    remaining_attempts: Some(0),
                    remaining_time: Some(info.remaining_ms()),
                }),
                None => {
                    info!(conn_id = %self.conn_id, ip = %self.addr, remaining, "Wrong password");
                    self.send(ServerEvent::AuthFailed {
                        error: format!("Wrong credentials. Remaining attempts: {remaining}"),
                        lockout: false,
                        attempts: Some(record.attempts),
                        remaining_attempts: Some(remaining),
                        remaining_time: None,
                    });
                }
            }
            return Flow::Continue;
        }

        let token = match self.state.authority.issue_token(&self.conn_id, self.addr) {
            Ok(token) => token,
            Err(e) => {
                error!(conn_id = %self.conn_id, error = %e, "Token issue failed");
                self.send(ServerEvent::auth_failed("Authentication unavailable", false));
                return Flow::Continue;
            }
        };

        if self.state.sessions.authenticate(&self.conn_id, token.clone()).is_err() {
            return Flow::Disconnect;
        }
        guard.clear(self.addr);
        info!(conn_id = %self.conn_id, ip = %self.addr, "Session authenticated");

        self.send(ServerEvent::AuthSuccess {
            message: "Authentication successful".to_string(),
            user: self.state.runner.config().user.clone(),
            server: format!("Shellgate v{} ({})", env!("CARGO_PKG_VERSION"), self.addr),
            timestamp: Utc::now(),
            token,
        });
        Flow::Continue
    }

    // ── execute_command ──────────────────────────────────────────────────

    fn execute(&self, command: String) -> Flow {
        if command.trim().is_empty() || command.chars().count() > MAX_RAW_COMMAND_CHARS {
            warn!(conn_id = %self.conn_id, ip = %self.addr, "Command failed format validation");
            self.send(ServerEvent::error("Invalid command format", None));
            return Flow::Continue;
        }

        let authenticated = match self.state.sessions.validate(&self.conn_id, &self.state.authority) {
            SessionValidation::Valid(info) => info.authenticated,
            SessionValidation::Expired(_) => {
                info!(conn_id = %self.conn_id, "Authenticated session expired, continuing as guest");
                self.send(ServerEvent::auth_failed("Session expired", false));
                false
            }
            SessionValidation::InvalidToken | SessionValidation::TokenMismatch => {
                warn!(conn_id = %self.conn_id, ip = %self.addr, "Session token rejected");
                self.state.sessions.delete(&self.conn_id);
                self.send(ServerEvent::auth_failed("Session expired or invalid", false));
                return Flow::Disconnect;
            }
            SessionValidation::Missing => return Flow::Disconnect,
        };

        let decision = self.state.guard.check_rate(self.addr, authenticated);
        if !decision.allowed {
            if decision.should_disconnect {
                warn!(conn_id = %self.conn_id, ip = %self.addr, "Disconnecting after guest rate limit");
                return Flow::Disconnect;
            }
            let secs = decision.retry_after.as_secs().max(1);
            self.send(ServerEvent::error(
                format!("Rate limit exceeded. Try again in {secs} seconds."),
                None,
            ));
            return Flow::Continue;
        }

        self.state.sessions.record_command(&self.conn_id);

        if let Some(pseudo) = PseudoCommand::parse(&command) {
            self.pseudo(pseudo, authenticated);
            return Flow::Continue;
        }

        let ctx = self.clone();
        tokio::spawn(async move { ctx.run(command, authenticated).await });
        Flow::Continue
    }

    fn pseudo(&self, command: PseudoCommand, authenticated: bool) {
        let output = match command {
            PseudoCommand::Help => help_text(
                authenticated,
                &self.state.runner.config().guest_commands,
                self.addr,
            ),
            PseudoCommand::Session => session_text(
                self.state.sessions.info(&self.conn_id).as_ref(),
                self.state.guard.attempts(self.addr),
                self.state.guard.is_locked(self.addr),
            ),
        };
        self.send(ServerEvent::output(output, self.cwd()));
    }

    async fn run(&self, command: String, authenticated: bool) {
        let sink = Arc::new(ConnectionSink::new(self.outbound.clone()));
        let result = self
            .state
            .runner
            .execute(&self.conn_id, &command, authenticated, sink)
            .await;

        match result {
            Ok(ExecOutcome::Builtin { output }) => self.send(ServerEvent::output(output, self.cwd())),
            Ok(ExecOutcome::Completed { .. }) | Ok(ExecOutcome::Cancelled) => {}
            Err(ExecError::Denied { reason }) if !authenticated => {
                debug!(conn_id = %self.conn_id, ip = %self.addr, reason = %reason, "Guest command denied");
                self.send(ServerEvent::error(
                    "Authentication required for this command",
                    self.cwd(),
                ));
            }
            Err(e) => {
                debug!(conn_id = %self.conn_id, error = %e, "Command failed");
                self.send(ServerEvent::error(e.to_string(), self.cwd()));
            }
        }
    }

    // ── command_input / cancel_command ───────────────────────────────────

    fn input(&self, input: &str) -> Flow {
        if !self.state.runner.send_input(&self.conn_id, input) {
            self.send(ServerEvent::error("No active process to receive input", self.cwd()));
        }
        Flow::Continue
    }

    fn cancel(&self) -> Flow {
        if self.state.runner.cancel(&self.conn_id) {
            self.send(ServerEvent::CommandCancel {});
        }
        Flow::Continue
    }
}
