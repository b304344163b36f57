//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Limits and environment for spawned commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Commands are cut to this many characters before anything else
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,
    /// Hard kill-timeout per attempt, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Silence window before a running process is re-run under a PTY, in milliseconds
    #[serde(default = "default_pty_grace_ms")]
    pub pty_grace_ms: u64,
    /// Interpreter used for `-c` dispatch and PTY runs
    #[serde(default = "default_shell")]
    pub shell: String,
    /// `PATH` given to every child
    #[serde(default = "default_path")]
    pub path: String,
    /// `HOME` given to every child, and the `cd` target with no argument
    #[serde(default = "default_home")]
    pub home: String,
    /// `USER` given to every child
    #[serde(default = "default_user")]
    pub user: String,
    /// Initial working directory of new sessions; the server's cwd when unset
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// First tokens a guest may run
    #[serde(default = "default_guest_commands")]
    pub guest_commands: Vec<String>,
}

fn default_max_command_length() -> usize {
    200
}
fn default_command_timeout_secs() -> u64 {
    30
}
fn default_pty_grace_ms() -> u64 {
    3000
}
fn default_shell() -> String {
    "/bin/bash".to_string()
}
fn default_path() -> String {
    "/usr/local/bin:/usr/bin:/bin".to_string()
}
fn default_home() -> String {
    "/tmp".to_string()
}
fn default_user() -> String {
    "webshell".to_string()
}
fn default_guest_commands() -> Vec<String> {
    ["ls", "pwd", "whoami", "date", "uptime", "help", "clear", "echo", "session"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_command_length: default_max_command_length(),
            command_timeout_secs: default_command_timeout_secs(),
            pty_grace_ms: default_pty_grace_ms(),
            shell: default_shell(),
            path: default_path(),
            home: default_home(),
            user: default_user(),
            working_directory: None,
            guest_commands: default_guest_commands(),
        }
    }
}

impl ExecConfig {
    /// Kill-timeout per attempt
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// PTY escalation grace period
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.pty_grace_ms)
    }

    /// Directory new sessions start in.
    pub fn initial_directory(&self) -> PathBuf {
        self.working_directory
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    /// The restricted environment every child receives.
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PATH", self.path.clone()),
            ("HOME", self.home.clone()),
            ("USER", self.user.clone()),
            ("SHELL", self.shell.clone()),
        ]
    }
}
