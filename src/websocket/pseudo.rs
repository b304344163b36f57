//! Pseudo-commands answered by the gateway itself

use shellgate_core::SessionInfo;
use std::fmt::Write;
use std::net::IpAddr;

/// Gateway-local commands that never reach the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoCommand {
    Help,
    Session,
}

impl PseudoCommand {
    /// Match a whole command line, case-insensitively.
    pub fn parse(command: &str) -> Option<Self> {
        match command.trim().to_ascii_lowercase().as_str() {
            "help" => Some(PseudoCommand::Help),
            "session" => Some(PseudoCommand::Session),
            _ => None,
        }
    }
}

pub fn help_text(authenticated: bool, guest_commands: &[String], addr: IpAddr) -> String {
    let (tier, available) = if authenticated {
        (
            "AUTHENTICATED - all commands available",
            "All system commands (restricted ones excepted)".to_string(),
        )
    } else {
        ("GUEST - limited commands only", guest_commands.join(", "))
    };

    let mut text = String::new();
    let _ = writeln!(text, "Shellgate v{}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(text, "==================");
    let _ = writeln!(text, "Tier: {tier}\n");
    let _ = writeln!(text, "Available commands:\n{available}\n");
    let _ = writeln!(text, "Special commands:");
    for (name, what) in [
        ("clear", "clear the screen"),
        ("exit", "end the session"),
        ("help", "show this message"),
        ("session", "show session details"),
    ] {
        let _ = writeln!(text, "  {name:<8} - {what}");
    }
    if !authenticated {
        let _ = writeln!(text, "\nAuthenticate to unlock every command.");
    }
    let _ = writeln!(text, "\nYour IP: {addr}");
    text
}

pub fn session_text(info: Option<&SessionInfo>, failed_attempts: u32, locked: bool) -> String {
    let Some(info) = info else {
        return "No session information available".to_string();
    };
    let yes_no = |flag: bool| if flag { "YES" } else { "NO" };

    let mut text = String::new();
    let _ = writeln!(text, "Session");
    let _ = writeln!(text, "==================");
    let _ = writeln!(text, "Connection: {}", info.id);
    let _ = writeln!(text, "IP: {}", info.ip);
    let _ = writeln!(text, "Authenticated: {}", yes_no(info.authenticated));
    let _ = writeln!(text, "Started: {}", info.start_time.to_rfc3339());
    let _ = writeln!(text, "Last activity: {}", info.last_activity.to_rfc3339());
    let _ = writeln!(text, "Commands sent: {}", info.command_count);
    let _ = writeln!(text, "Directory: {}", info.current_directory.display());
    let _ = writeln!(text, "Active process: {}", yes_no(info.has_active_process));
    let _ = writeln!(text, "PTY mode: {}\n", yes_no(info.pty_mode));
    let _ = writeln!(text, "Failed attempts: {failed_attempts}");
    let _ = write!(text, "Lockout: {}", yes_no(locked));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

    #[test]
    fn test_parse() {
        assert_eq!(PseudoCommand::parse("help"), Some(PseudoCommand::Help));
        assert_eq!(PseudoCommand::parse("  SESSION "), Some(PseudoCommand::Session));
        assert_eq!(PseudoCommand::parse("help me"), None);
        assert_eq!(PseudoCommand::parse("ls"), None);
    }

    #[test]
    fn test_help_lists_tier_and_commands() {
        let guest = help_text(false, &["ls".to_string(), "pwd".to_string()], ADDR);
        assert!(guest.contains("GUEST"));
        assert!(guest.contains("ls, pwd"));
        assert!(guest.contains("Authenticate to unlock"));
        assert!(guest.contains("192.0.2.10"));

        let full = help_text(true, &[], ADDR);
        assert!(full.contains("AUTHENTICATED"));
        assert!(full.contains("All system commands"));
        assert!(!full.contains("Authenticate to unlock"));
        assert!(full.contains("session "));
    }

    #[test]
    fn test_session_text() {
        let info = SessionInfo {
            id: "conn-9".into(),
            ip: ADDR,
            authenticated: true,
            start_time: Utc::now(),
            last_activity: Utc::now(),
            command_count: 4,
            current_directory: PathBuf::from("/srv"),
            has_active_process: false,
            pty_mode: false,
        };
        let text = session_text(Some(&info), 2, false);
        assert!(text.contains("Connection: conn-9"));
        assert!(text.contains("Commands sent: 4"));
        assert!(text.contains("Directory: /srv"));
        assert!(text.contains("Failed attempts: 2"));
        assert!(text.ends_with("Lockout: NO"));

        assert_eq!(session_text(None, 0, false), "No session information available");
    }
}
