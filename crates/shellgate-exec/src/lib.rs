//! Shellgate Exec - Command Runner
//!
//! This crate runs commands on behalf of sessions:
//! - Command: truncation, builtin detection, shell dispatch for metacharacters
//! - Builtins: `cd`, resolved against the session directory
//! - Plain execution: piped stdio, restricted environment, kill-timeout
//! - PTY escalation: silent processes are re-run under a pseudo-terminal
//! - Events: output chunks, PTY markers and completion, in delivery order

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod attempt;
pub mod builtin;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
mod plain;
pub mod pty;
pub mod runner;

#[cfg(test)]
mod tests;

pub use command::{Builtin, CommandLine};
pub use config::ExecConfig;
pub use error::{ExecError, Result};
pub use events::{ExecEvent, ExecSink, RecordingSink, StreamKind};
pub use pty::looks_like_prompt;
pub use runner::{CommandRunner, ExecOutcome};
