//! Guest command policy
//!
//! Checks run in a fixed order and stop at the first failure:
//! length cap, command denylist, metacharacter patterns, guest allowlist.

use regex::RegexSet;
use std::sync::LazyLock;

/// Prefixes a guest command may never start with (matched on the
/// lower-cased, trimmed command).
pub const DENIED_PREFIXES: &[&str] = &[
    // Destructive filesystem
    "rm", "rmdir", "mv", "cp", "dd", "mkfs", "mount", "umount",
    // Permissions and privilege
    "chmod", "chown", "sudo", "su", "passwd", "usermod",
    // Process and system control
    "kill", "killall", "pkill", "reboot", "shutdown", "halt",
    "iptables", "ufw", "systemctl", "service",
    // Persistence and network tunnels
    "crontab", "at", "ssh", "scp", "rsync",
    // Fork bomb
    ":(){ :|:& };:",
    // Shell interpreters
    "bash", "sh", "zsh",
    // Raw filesystem roots
    "/bin/", "/usr/", "/etc/",
];

/// Substitution, chaining, traversal, device access, redirection and
/// control characters.
static DANGEROUS_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // Line breaks would start a second command under `shell -c`
        r"\p{Cc}",
        r"\$\(.*\)",
        r"`.*`",
        r"&&",
        r"\|\|",
        r";",
        r"\.\./",
        r"/dev/",
        r"/proc/",
        r"/sys/",
        r">",
        r"<",
        r"\|",
    ])
    .expect("dangerous pattern set is valid")
});

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// Command may run
    Allowed,
    /// Longer than the configured cap
    TooLong,
    /// Starts with a denied prefix
    Denied(&'static str),
    /// Contains a dangerous metacharacter pattern
    DangerousPattern,
    /// First token is not on the guest allowlist
    NotAllowlisted,
}

impl PolicyVerdict {
    /// Whether the command may run.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allowed)
    }
}

/// Classify `command` for the caller's trust tier.
pub fn evaluate(
    command: &str,
    authenticated: bool,
    guest_commands: &[String],
    max_length: usize,
) -> PolicyVerdict {
    if authenticated {
        return PolicyVerdict::Allowed;
    }

    if command.chars().count() > max_length {
        return PolicyVerdict::TooLong;
    }

    let normalized = command.trim().to_lowercase();

    if let Some(prefix) = DENIED_PREFIXES.iter().find(|p| normalized.starts_with(*p)) {
        return PolicyVerdict::Denied(*prefix);
    }

    if DANGEROUS_PATTERNS.is_match(command) {
        return PolicyVerdict::DangerousPattern;
    }

    let base = normalized.split_whitespace().next().unwrap_or("");
    if guest_commands.iter().any(|allowed| allowed == base) {
        PolicyVerdict::Allowed
    } else {
        PolicyVerdict::NotAllowlisted
    }
}

/// `true` when `command` may run for the caller's trust tier.
pub fn is_command_safe(
    command: &str,
    authenticated: bool,
    guest_commands: &[String],
    max_length: usize,
) -> bool {
    evaluate(command, authenticated, guest_commands, max_length).is_allowed()
}
