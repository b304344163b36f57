//! Shared gateway state
//!
//! Every HTTP handler and WebSocket connection reads the same stores through
//! one `Extension<Arc<AppState>>`.

use super::config::AppConfig;
use anyhow::{Context, Result};
use shellgate_core::{AbuseGuard, CredentialAuthority, SessionRegistry};
use shellgate_exec::CommandRunner;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct AppState {
    pub guard: Arc<AbuseGuard>,
    pub authority: Arc<CredentialAuthority>,
    pub sessions: Arc<SessionRegistry>,
    pub runner: CommandRunner,
    pub trust_proxy_headers: bool,
    pub max_message_bytes: usize,
    pub environment: String,
    started_at: Instant,
}

impl AppState {
    /// Build the stores from validated configuration
    pub fn from_config(config: &AppConfig, environment: String) -> Result<Self> {
        let authority = CredentialAuthority::new(&config.auth)
            .context("Failed to initialize credential authority")?;
        let sessions = Arc::new(SessionRegistry::new(config.sessions.clone()));
        let runner = CommandRunner::new(config.executor.clone(), Arc::clone(&sessions));

        Ok(Self {
            guard: Arc::new(AbuseGuard::new(config.security.guard.clone())),
            authority: Arc::new(authority),
            sessions,
            runner,
            trust_proxy_headers: config.server.trust_proxy_headers,
            max_message_bytes: config.server.max_message_bytes,
            environment,
            started_at: Instant::now(),
        })
    }

    /// Time since the state was built
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
