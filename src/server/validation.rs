//! Startup configuration validation
//!
//! Fatal problems return an error; weak settings only warn.

use super::config::AppConfig;
use super::loader::environment_name;
use anyhow::{bail, Result};
use shellgate_core::{is_bcrypt_hash, MAX_GUEST_BAN};
use tracing::warn;

/// Validate configuration before anything is bound or spawned
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.auth.jwt_secret.as_deref() {
        Some(secret) if !secret.trim().is_empty() => {}
        _ => bail!("auth.jwt_secret is not set (SHELLGATE_AUTH__JWT_SECRET or JWT_SECRET)"),
    }

    let guard = &config.security.guard;
    let non_zero = [
        ("auth.token_ttl_secs", config.auth.token_ttl_secs),
        ("security.max_attempts", u64::from(guard.max_attempts)),
        ("security.lockout_secs", guard.lockout_secs),
        ("security.cleanup_interval_secs", guard.cleanup_interval_secs),
        ("security.guest_window_ms", guard.guest_window_ms),
        ("security.guest_max_requests", u64::from(guard.guest_max_requests)),
        ("security.auth_endpoint_window_secs", config.security.auth_endpoint_window_secs),
        ("security.auth_endpoint_max_requests", u64::from(config.security.auth_endpoint_max_requests)),
        ("sessions.timeout_secs", config.sessions.timeout_secs),
        ("sessions.cleanup_interval_secs", config.sessions.cleanup_interval_secs),
        ("executor.max_command_length", config.executor.max_command_length as u64),
        ("executor.command_timeout_secs", config.executor.command_timeout_secs),
        ("server.max_message_bytes", config.server.max_message_bytes as u64),
    ];
    for (key, value) in non_zero {
        if value == 0 {
            bail!("{} must be greater than zero", key);
        }
    }

    if guard.guest_ban_secs > MAX_GUEST_BAN.as_secs() {
        bail!(
            "security.guest_ban_secs = {} exceeds the {}s maximum",
            guard.guest_ban_secs,
            MAX_GUEST_BAN.as_secs()
        );
    }

    match config.auth.password_hash.as_deref() {
        None => warn!(
            "SECURITY WARNING: No password hash configured (SHELL_HASHWORD). \
             Every authentication attempt will fail; only guest mode is usable."
        ),
        Some(hash) if !is_bcrypt_hash(hash) => warn!(
            "SECURITY WARNING: auth.password_hash is not a bcrypt hash. \
             Every authentication attempt will fail."
        ),
        Some(_) => {}
    }

    if environment_name().eq_ignore_ascii_case("production") && config.server.cors_origins.is_empty() {
        warn!("SECURITY WARNING: CORS is permissive in production. Set server.cors_origins.");
    }

    if config.server.trust_proxy_headers {
        warn!(
            "SECURITY WARNING: server.trust_proxy_headers is on. Clients can pick their own \
             address for lockouts and bans unless a reverse proxy overwrites X-Forwarded-For."
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("test-secret".to_string());
        config
    }

    #[test]
    fn test_defaults_with_secret_pass() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let mut config = valid();
        config.auth.jwt_secret = None;
        assert!(validate_config(&config).is_err());

        config.auth.jwt_secret = Some("   ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_threshold_is_fatal() {
        let mut config = valid();
        config.security.guard.guest_max_requests = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("security.guest_max_requests"));
    }

    #[test]
    fn test_unbounded_ban_is_fatal() {
        let mut config = valid();
        config.security.guard.guest_ban_secs = MAX_GUEST_BAN.as_secs() + 1;
        assert!(validate_config(&config).is_err());

        config.security.guard.guest_ban_secs = MAX_GUEST_BAN.as_secs();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_proxy_headers_off_by_default() {
        assert!(!AppConfig::default().server.trust_proxy_headers);

        let mut config = valid();
        config.server.trust_proxy_headers = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_bad_hash_only_warns() {
        let mut config = valid();
        config.auth.password_hash = Some("plaintext".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
