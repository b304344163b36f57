//! Server configuration types
//!
//! One section per component; library sections reuse the library types.

use serde::{Deserialize, Serialize};
use shellgate_core::{AuthConfig, GuardConfig, SessionConfig, WindowPolicy};
use shellgate_exec::ExecConfig;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub executor: ExecConfig,
}

/// Listener and transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Honour `X-Forwarded-For` / `X-Real-IP` when resolving the client address.
    /// Only safe behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
    /// Largest inbound WebSocket frame, in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Allowed CORS origins; empty means permissive
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_max_message_bytes() -> usize {
    16 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_proxy_headers: false,
            max_message_bytes: default_max_message_bytes(),
            cors_origins: Vec::new(),
        }
    }
}

/// Abuse thresholds: the guard's settings plus the `/auth` endpoint limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(flatten)]
    pub guard: GuardConfig,
    #[serde(default = "default_auth_window_secs")]
    pub auth_endpoint_window_secs: u64,
    #[serde(default = "default_auth_max_requests")]
    pub auth_endpoint_max_requests: u32,
}

fn default_auth_window_secs() -> u64 {
    15 * 60
}
fn default_auth_max_requests() -> u32 {
    5
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            guard: GuardConfig::default(),
            auth_endpoint_window_secs: default_auth_window_secs(),
            auth_endpoint_max_requests: default_auth_max_requests(),
        }
    }
}

impl SecurityConfig {
    /// Fixed-window policy for `/auth/*`. No ban escalation: a blocked
    /// address waits out the rest of the window.
    pub fn auth_endpoint_policy(&self) -> WindowPolicy {
        let window = Duration::from_secs(self.auth_endpoint_window_secs);
        WindowPolicy {
            max_requests: self.auth_endpoint_max_requests,
            window,
            block_for: window,
            disconnect: false,
        }
    }
}
