//! Gateway wire protocol
//!
//! Every frame is a JSON text frame `{"event": "<name>", "data": {...}}`.
//! Inbound events outside the allow-list, or with payloads missing their
//! string fields, are protocol violations.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shellgate_exec::StreamKind;

// ============================================================================
// Inbound
// ============================================================================

/// Reasons an inbound frame is refused. Each one closes the connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("binary frames are not accepted")]
    Binary,

    #[error("frame is not a JSON event: {0}")]
    Malformed(String),

    #[error("event type not allowed: {0}")]
    UnknownEvent(String),

    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct AuthenticatePayload {
    password: String,
}

#[derive(Deserialize)]
struct ExecutePayload {
    command: String,
}

#[derive(Deserialize)]
struct InputPayload {
    input: String,
}

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Exchange the shared password for a token
    Authenticate { password: String },
    /// Run a command
    ExecuteCommand { command: String },
    /// Feed a line to the running process
    CommandInput { input: String },
    /// Terminate the running process
    CancelCommand,
}

impl ClientEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolViolation> {
        let frame: RawFrame =
            serde_json::from_str(text).map_err(|e| ProtocolViolation::Malformed(e.to_string()))?;

        match frame.event.as_str() {
            "authenticate" => payload::<AuthenticatePayload>("authenticate", frame.data)
                .map(|p| ClientEvent::Authenticate { password: p.password }),
            "execute_command" => payload::<ExecutePayload>("execute_command", frame.data)
                .map(|p| ClientEvent::ExecuteCommand { command: p.command }),
            "command_input" => payload::<InputPayload>("command_input", frame.data)
                .map(|p| ClientEvent::CommandInput { input: p.input }),
            "cancel_command" => Ok(ClientEvent::CancelCommand),
            other => Err(ProtocolViolation::UnknownEvent(truncate(other, 64))),
        }
    }

    /// Event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Authenticate { .. } => "authenticate",
            ClientEvent::ExecuteCommand { .. } => "execute_command",
            ClientEvent::CommandInput { .. } => "command_input",
            ClientEvent::CancelCommand => "cancel_command",
        }
    }
}

fn payload<T: DeserializeOwned>(event: &'static str, data: Value) -> Result<T, ProtocolViolation> {
    serde_json::from_value(data).map_err(|e| ProtocolViolation::InvalidPayload {
        event,
        reason: e.to_string(),
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ============================================================================
// Outbound
// ============================================================================

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Password accepted; the session is now authenticated
    AuthSuccess {
        message: String,
        user: String,
        server: String,
        timestamp: DateTime<Utc>,
        /// Bearer token bound to this connection and address
        token: String,
    },
    /// Authentication refused, or an authenticated session lost its standing
    AuthFailed {
        error: String,
        lockout: bool,
        /// Failures recorded for the address
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_attempts: Option<u32>,
        /// Lock time left, in milliseconds
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_time: Option<u64>,
    },
    /// Whole-message output (builtins, pseudo-commands)
    CommandOutput {
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_directory: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// The command could not run or did not finish
    CommandError {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_directory: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// One chunk of process output
    CommandStream {
        #[serde(rename = "type")]
        stream: StreamKind,
        data: String,
    },
    /// The process exited on its own
    CommandComplete {
        success: bool,
        exit_code: Option<i32>,
        current_directory: String,
    },
    /// The command was re-run under a pseudo-terminal
    PtySessionStarted {},
    /// The PTY output looks like a prompt
    PtyInputReady {},
    /// The running process was cancelled on request
    CommandCancel {},
}

impl ServerEvent {
    pub fn auth_failed(error: impl Into<String>, lockout: bool) -> Self {
        ServerEvent::AuthFailed {
            error: error.into(),
            lockout,
            attempts: None,
            remaining_attempts: None,
            remaining_time: None,
        }
    }

    pub fn output(output: impl Into<String>, current_directory: Option<String>) -> Self {
        ServerEvent::CommandOutput {
            output: output.into(),
            current_directory,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl Into<String>, current_directory: Option<String>) -> Self {
        ServerEvent::CommandError {
            error: error.into(),
            current_directory,
            timestamp: Utc::now(),
        }
    }

    /// JSON text for the wire
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
