//! Shellgate Core - Gatekeeping State
//!
//! This crate holds the in-memory state that decides who may run what:
//! - Guard: authentication lockout, guest rate windows and bans
//! - Policy: guest command allow/deny rules
//! - Credentials: password verification and connection-bound tokens
//! - Sessions: one record per connection, with its single active process

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod guard;
pub mod session;

pub use credentials::{is_bcrypt_hash, AuthConfig, AuthError, CredentialAuthority, TokenClaims};
pub use guard::{
    evaluate, is_command_safe, AbuseGuard, GuardConfig, LockoutInfo, LockoutRecord, PolicyVerdict,
    RateDecision, RateWindows, SweepReport, WindowPolicy, MAX_GUEST_BAN,
};
pub use session::{
    ProcessHandle, ProcessId, ProcessMode, ProcessSignal, SessionConfig, SessionError,
    SessionInfo, SessionRegistry, SessionStats, SessionValidation,
};
