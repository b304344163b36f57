//! Configuration loading
//!
//! Embedded defaults, then optional files, then `SHELLGATE_*` environment
//! variables. Bare legacy variables (`JWT_SECRET`, `SHELL_HASHWORD`, `PORT`,
//! `HOST`) apply only when the prefixed key is absent.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// (legacy variable, config key, prefixed variable)
const LEGACY_ENV: &[(&str, &str, &str)] = &[
    ("JWT_SECRET", "auth.jwt_secret", "SHELLGATE_AUTH__JWT_SECRET"),
    ("SHELL_HASHWORD", "auth.password_hash", "SHELLGATE_AUTH__PASSWORD_HASH"),
    ("PORT", "server.port", "SHELLGATE_SERVER__PORT"),
    ("HOST", "server.host", "SHELLGATE_SERVER__HOST"),
];

/// Deployment environment name (`SHELLGATE_ENV`, default `development`)
pub fn environment_name() -> String {
    std::env::var("SHELLGATE_ENV").unwrap_or_else(|_| "development".to_string())
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", environment_name())).required(false))
        .add_source(File::with_name("config/local").required(false))
        // prefix_separator("_") so SHELLGATE_AUTH__JWT_SECRET maps to auth.jwt_secret
        .add_source(
            Environment::with_prefix("SHELLGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    for (key, value) in legacy_overrides(|name| std::env::var(name).ok()) {
        builder = builder
            .set_override(key, value)
            .with_context(|| format!("Invalid override for {}", key))?;
    }

    builder
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

fn legacy_overrides(lookup: impl Fn(&str) -> Option<String>) -> Vec<(&'static str, String)> {
    LEGACY_ENV
        .iter()
        .filter(|(_, _, prefixed)| lookup(prefixed).is_none())
        .filter_map(|(legacy, key, _)| lookup(legacy).map(|value| (*key, value)))
        .filter(|(_, value)| !value.is_empty())
        .collect()
}
