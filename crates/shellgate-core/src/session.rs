//! Session registry
//!
//! One [`Session`] per live connection, keyed by connection id. A session
//! holds at most one active process; every operation that replaces or clears
//! it compares process identity first, so a stale timer or supervisor cannot
//! act on a process that has already been superseded.

mod process;


pub use process::{ProcessHandle, ProcessId, ProcessMode, ProcessSignal};

use crate::credentials::{AuthError, CredentialAuthority};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session for this connection
    #[error("session not found: {0}")]
    NotFound(String),

    /// A process is already running for this connection
    #[error("a command is already running for session {0}")]
    Busy(String),
}

/// Session result type
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity before a session expires, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sweep period in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_timeout_secs() -> u64 {
    3600
}
fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl SessionConfig {
    fn timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.timeout_secs).unwrap_or(i64::MAX))
    }
}

/// State kept for one connection.
#[derive(Debug)]
pub struct Session {
    /// Connection id
    pub conn_id: String,
    /// Peer address
    pub address: IpAddr,
    /// Whether the connection passed password authentication
    pub authenticated: bool,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last command or successful validation
    pub last_activity: DateTime<Utc>,
    /// Commands accepted so far
    pub command_count: u64,
    /// Working directory for the next command
    pub cwd: PathBuf,
    /// The in-flight process, if any
    pub active: Option<ProcessHandle>,
    /// Token bound to this session after authentication
    pub token: Option<String>,
    closed: CancellationToken,
}

impl Session {
    fn new(conn_id: String, address: IpAddr, cwd: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            conn_id,
            address,
            authenticated: false,
            created_at: now,
            last_activity: now,
            command_count: 0,
            cwd,
            active: None,
            token: None,
            closed: CancellationToken::new(),
        }
    }

    fn demote(&mut self) {
        self.authenticated = false;
        self.token = None;
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.conn_id.clone(),
            ip: self.address,
            authenticated: self.authenticated,
            start_time: self.created_at,
            last_activity: self.last_activity,
            command_count: self.command_count,
            current_directory: self.cwd.clone(),
            has_active_process: self.active.is_some(),
            pty_mode: matches!(
                self.active.as_ref().map(ProcessHandle::mode),
                Some(ProcessMode::Pty)
            ),
        }
    }
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Connection id
    pub id: String,
    /// Peer address
    pub ip: IpAddr,
    /// Authentication state
    pub authenticated: bool,
    /// Creation time
    pub start_time: DateTime<Utc>,
    /// Last activity
    pub last_activity: DateTime<Utc>,
    /// Commands accepted so far
    pub command_count: u64,
    /// Working directory
    pub current_directory: PathBuf,
    /// Whether a process is in flight
    pub has_active_process: bool,
    /// Whether the in-flight process runs under a PTY
    pub pty_mode: bool,
}

/// Outcome of [`SessionRegistry::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidation {
    /// Session exists and its authentication (if any) still holds
    Valid(SessionInfo),
    /// No session for the connection
    Missing,
    /// Authenticated session idled past the timeout; now demoted to guest
    Expired(SessionInfo),
    /// Stored token failed signature, issuer or expiry checks; demoted
    InvalidToken,
    /// Stored token belongs to another connection or address; demoted
    TokenMismatch,
}

impl SessionValidation {
    /// The session snapshot when the session may keep going.
    pub fn info(&self) -> Option<&SessionInfo> {
        match self {
            SessionValidation::Valid(info) | SessionValidation::Expired(info) => Some(info),
            _ => None,
        }
    }
}

/// Session counts for the status endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Live sessions
    pub total: usize,
    /// Authenticated sessions
    pub authenticated: usize,
    /// Sessions with a process in flight
    pub active: usize,
}

/// All live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Lifetime settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Register a session. Returns the signal fired when it is deleted.
    pub fn create(&self, conn_id: &str, address: IpAddr, cwd: PathBuf) -> CancellationToken {
        let session = Session::new(conn_id.to_string(), address, cwd);
        let closed = session.closed.clone();
        if let Some(previous) = self.sessions.insert(conn_id.to_string(), session) {
            Self::teardown(&previous);
        }
        info!(conn_id = %conn_id, ip = %address, "Session created");
        closed
    }

    /// Whether a session exists.
    pub fn contains(&self, conn_id: &str) -> bool {
        self.sessions.contains_key(conn_id)
    }

    /// Mark the session authenticated and bind `token` to it.
    pub fn authenticate(&self, conn_id: &str, token: String) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(conn_id)
            .ok_or_else(|| SessionError::NotFound(conn_id.to_string()))?;
        session.authenticated = true;
        session.token = Some(token);
        session.last_activity = Utc::now();
        info!(conn_id = %conn_id, ip = %session.address, "Session authenticated");
        Ok(())
    }

    /// Re-check a session's authentication against its stored token.
    pub fn validate(&self, conn_id: &str, authority: &CredentialAuthority) -> SessionValidation {
        self.validate_at(conn_id, authority, Utc::now())
    }

    pub(crate) fn validate_at(
        &self,
        conn_id: &str,
        authority: &CredentialAuthority,
        now: DateTime<Utc>,
    ) -> SessionValidation {
        let Some(mut session) = self.sessions.get_mut(conn_id) else {
            return SessionValidation::Missing;
        };

        if session.authenticated {
            if now - session.last_activity > self.config.timeout() {
                session.demote();
                warn!(conn_id = %conn_id, ip = %session.address, "Authenticated session expired");
                return SessionValidation::Expired(session.info());
            }

            let verdict = match session.token.as_deref() {
                Some(token) => authority.verify_bound(token, conn_id, session.address),
                None => Err(AuthError::InvalidToken("no token bound".to_string())),
            };
            if let Err(e) = verdict {
                session.demote();
                warn!(conn_id = %conn_id, ip = %session.address, error = %e, "Session token rejected");
                return match e {
                    AuthError::TokenMismatch => SessionValidation::TokenMismatch,
                    _ => SessionValidation::InvalidToken,
                };
            }
        }

        session.last_activity = now;
        SessionValidation::Valid(session.info())
    }

    /// Drop the session, force-kill its process and fire its close signal.
    pub fn delete(&self, conn_id: &str) -> bool {
        match self.sessions.remove(conn_id) {
            Some((_, session)) => {
                Self::teardown(&session);
                info!(
                    conn_id = %conn_id,
                    ip = %session.address,
                    commands = session.command_count,
                    "Session deleted"
                );
                true
            }
            None => false,
        }
    }

    /// Delete every session.
    pub fn delete_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.delete(id)).count()
    }

    fn teardown(session: &Session) {
        if let Some(process) = &session.active {
            process.kill();
        }
        session.closed.cancel();
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// Snapshot of one session.
    pub fn info(&self, conn_id: &str) -> Option<SessionInfo> {
        self.sessions.get(conn_id).map(|s| s.info())
    }

    /// Whether the session is authenticated. `false` when missing.
    pub fn is_authenticated(&self, conn_id: &str) -> bool {
        self.sessions
            .get(conn_id)
            .map(|s| s.authenticated)
            .unwrap_or(false)
    }

    /// Counts across all sessions.
    pub fn stats(&self) -> SessionStats {
        self.sessions
            .iter()
            .fold(SessionStats::default(), |mut stats, entry| {
                stats.total += 1;
                if entry.authenticated {
                    stats.authenticated += 1;
                }
                if entry.active.is_some() {
                    stats.active += 1;
                }
                stats
            })
    }

    // ── Working directory ────────────────────────────────────────────────

    /// Current working directory.
    pub fn directory(&self, conn_id: &str) -> Option<PathBuf> {
        self.sessions.get(conn_id).map(|s| s.cwd.clone())
    }

    /// Replace the working directory.
    pub fn set_directory(&self, conn_id: &str, cwd: &Path) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(conn_id)
            .ok_or_else(|| SessionError::NotFound(conn_id.to_string()))?;
        session.cwd = cwd.to_path_buf();
        Ok(())
    }

    /// Count an accepted command and refresh activity.
    pub fn record_command(&self, conn_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(conn_id) {
            session.command_count += 1;
            session.last_activity = Utc::now();
        }
    }

    // ── Active process ───────────────────────────────────────────────────

    /// Install `handle` as the active process. Refused while another runs.
    pub fn attach_process(&self, conn_id: &str, handle: ProcessHandle) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(conn_id)
            .ok_or_else(|| SessionError::NotFound(conn_id.to_string()))?;
        if session.active.is_some() {
            return Err(SessionError::Busy(conn_id.to_string()));
        }
        debug!(conn_id = %conn_id, pid = %handle.id(), mode = ?handle.mode(), "Process attached");
        session.active = Some(handle);
        Ok(())
    }

    /// Swap the active process for `handle`, only if `expected` is still active.
    pub fn replace_process(&self, conn_id: &str, expected: ProcessId, handle: ProcessHandle) -> bool {
        let Some(mut session) = self.sessions.get_mut(conn_id) else {
            return false;
        };
        match &session.active {
            Some(current) if current.id() == expected => {
                debug!(
                    conn_id = %conn_id,
                    from = %expected,
                    to = %handle.id(),
                    mode = ?handle.mode(),
                    "Process replaced"
                );
                session.active = Some(handle);
                true
            }
            _ => false,
        }
    }

    /// Whether `pid` is still the session's active process.
    pub fn is_current(&self, conn_id: &str, pid: ProcessId) -> bool {
        self.sessions
            .get(conn_id)
            .and_then(|s| s.active.as_ref().map(|p| p.id() == pid))
            .unwrap_or(false)
    }

    /// Clear the active process if it is still `pid`.
    pub fn release_process(&self, conn_id: &str, pid: ProcessId) -> bool {
        let Some(mut session) = self.sessions.get_mut(conn_id) else {
            return false;
        };
        if session.active.as_ref().map(ProcessHandle::id) == Some(pid) {
            session.active = None;
            return true;
        }
        false
    }

    /// Remove and return the active process, whatever it is.
    pub fn take_process(&self, conn_id: &str) -> Option<ProcessHandle> {
        self.sessions.get_mut(conn_id)?.active.take()
    }

    /// The active process, if any.
    pub fn active_process(&self, conn_id: &str) -> Option<ProcessHandle> {
        self.sessions.get(conn_id)?.active.clone()
    }

    // ── Expiry ───────────────────────────────────────────────────────────

    /// Delete every session idle past the timeout.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.timeout();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now - entry.last_activity > timeout)
            .map(|entry| entry.key().clone())
            .collect();
        expired.iter().filter(|id| self.delete(id)).count()
    }

    /// Run [`sweep`](Self::sweep) every cleanup interval until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_secs(registry.config.cleanup_interval_secs);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = registry.sweep();
                        if removed > 0 {
                            info!(removed, remaining = registry.sessions.len(), "Expired sessions removed");
                        }
                    }
                }
            }
        })
    }
}
