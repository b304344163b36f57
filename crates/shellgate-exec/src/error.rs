//! Error types for shellgate-exec

use shellgate_core::{PolicyVerdict, SessionError};
use thiserror::Error;

/// Execution error
#[derive(Debug, Error)]
pub enum ExecError {
    /// Refused by the caller's command policy; nothing was started
    #[error("Command not allowed: {reason}")]
    Denied {
        /// Human-readable reason
        reason: String,
    },

    /// The session already runs a command
    #[error("A command is already running")]
    Busy,

    /// No session for the connection
    #[error("Session not found")]
    SessionNotFound,

    /// A builtin failed; the message is shown to the caller as-is
    #[error("{0}")]
    Builtin(String),

    /// Neither the plain nor the PTY spawn succeeded
    #[error("Failed to start command: {0}")]
    SpawnFailed(String),

    /// Kill-timeout expired
    #[error("Command timed out ({0}s)")]
    Timeout(u64),

    /// Unexpected I/O failure
    #[error("Internal execution error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    pub(crate) fn denied(verdict: &PolicyVerdict) -> Self {
        let reason = match verdict {
            PolicyVerdict::Allowed => "allowed",
            PolicyVerdict::TooLong => "command too long",
            PolicyVerdict::Denied(_) => "restricted command",
            PolicyVerdict::DangerousPattern => "forbidden characters or patterns",
            PolicyVerdict::NotAllowlisted => "not available in guest mode",
        };
        Self::Denied {
            reason: reason.to_string(),
        }
    }
}

impl From<SessionError> for ExecError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => ExecError::SessionNotFound,
            SessionError::Busy(_) => ExecError::Busy,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ExecError>;
