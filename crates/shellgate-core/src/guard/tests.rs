use super::*;
use std::net::Ipv4Addr;

fn addr(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

fn guests() -> Vec<String> {
    ["ls", "pwd", "whoami", "date", "uptime", "help", "clear", "echo", "session"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn guard() -> AbuseGuard {
    AbuseGuard::new(GuardConfig::default())
}

// ── Lockout ──────────────────────────────────────────────────────────────

#[test]
fn test_lockout_after_threshold() {
    let guard = guard();
    let ip = addr(1);
    let now = Instant::now();

    guard.record_failure_at(ip, now);
    guard.record_failure_at(ip, now);
    assert!(!guard.is_locked_at(ip, now));
    assert_eq!(guard.remaining_attempts(ip), 1);

    let record = guard.record_failure_at(ip, now);
    assert_eq!(record.attempts, 3);
    assert!(record.locked_until.is_some());
    assert!(guard.is_locked_at(ip, now));
    assert_eq!(guard.remaining_attempts(ip), 0);
}

#[test]
fn test_clear_unlocks_immediately() {
    let guard = guard();
    let ip = addr(2);
    for _ in 0..3 {
        guard.record_failure(ip);
    }
    assert!(guard.is_locked(ip));

    guard.clear(ip);
    assert!(!guard.is_locked(ip));
    assert_eq!(guard.attempts(ip), 0);
}

#[test]
fn test_success_before_threshold_resets_counter() {
    let guard = guard();
    let ip = addr(3);
    guard.record_failure(ip);
    guard.record_failure(ip);
    guard.clear(ip);

    assert_eq!(guard.attempts(ip), 0);
    assert_eq!(guard.remaining_attempts(ip), 3);

    guard.record_failure(ip);
    assert!(!guard.is_locked(ip));
}

#[test]
fn test_lock_expires_and_record_is_dropped() {
    let guard = guard();
    let ip = addr(4);
    let now = Instant::now();
    for _ in 0..3 {
        guard.record_failure_at(ip, now);
    }

    let later = now + Duration::from_secs(301);
    assert!(!guard.is_locked_at(ip, later));
    assert_eq!(guard.attempts(ip), 0);
}

#[test]
fn test_lockout_info_remaining() {
    let guard = guard();
    let ip = addr(5);
    let now = Instant::now();
    assert!(guard.lockout_info_at(ip, now).is_none());

    for _ in 0..3 {
        guard.record_failure_at(ip, now);
    }
    let info = guard
        .lockout_info_at(ip, now + Duration::from_secs(60))
        .unwrap();
    assert!(info.locked);
    assert_eq!(info.remaining, Duration::from_secs(240));
    assert_eq!(info.remaining_ms(), 240_000);
    assert_eq!(info.remaining_minutes(), 4);
}

#[test]
fn test_addresses_are_independent() {
    let guard = guard();
    for _ in 0..3 {
        guard.record_failure(addr(6));
    }
    assert!(guard.is_locked(addr(6)));
    assert!(!guard.is_locked(addr(7)));
    assert_eq!(guard.locked_count(), 1);
}

// ── Rate windows ─────────────────────────────────────────────────────────

#[test]
fn test_guest_burst_disconnects_on_fourth_request() {
    let guard = guard();
    let ip = addr(10);
    let now = Instant::now();

    for i in 0..3 {
        let decision = guard.check_rate_at(ip, false, now + Duration::from_millis(i * 10));
        assert!(decision.allowed, "request {} should pass", i + 1);
        assert!(!decision.should_disconnect);
    }

    let fourth = guard.check_rate_at(ip, false, now + Duration::from_millis(50));
    assert!(!fourth.allowed);
    assert!(fourth.should_disconnect);
    assert!(fourth.blocked);
    assert!(guard.is_banned(ip));
}

#[test]
fn test_banned_address_rejected_without_disconnect_signal() {
    let guard = guard();
    let ip = addr(11);
    let now = Instant::now();
    for _ in 0..4 {
        guard.check_rate_at(ip, false, now);
    }

    let next = guard.check_rate_at(ip, false, now + Duration::from_secs(5));
    assert!(!next.allowed);
    assert!(next.blocked);
    assert!(!next.should_disconnect);
    assert_eq!(next.retry_after, Duration::from_secs(3600 - 5));
}

#[test]
fn test_window_resets_after_period() {
    let guard = guard();
    let ip = addr(12);
    let now = Instant::now();
    for _ in 0..3 {
        assert!(guard.check_rate_at(ip, false, now).allowed);
    }

    let next_window = now + Duration::from_millis(1001);
    let decision = guard.check_rate_at(ip, false, next_window);
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 2);
}

#[test]
fn test_authenticated_traffic_is_unmetered() {
    let guard = guard();
    let ip = addr(13);
    for _ in 0..100 {
        assert!(guard.check_rate(ip, true).allowed);
    }
    assert!(!guard.is_banned(ip));
}

#[test]
fn test_ban_is_bounded() {
    let config = GuardConfig {
        guest_ban_secs: 3_600_000,
        ..GuardConfig::default()
    };
    assert_eq!(config.guest_policy().block_for, MAX_GUEST_BAN);
}

#[test]
fn test_ban_lifts_after_block_duration() {
    let config = GuardConfig {
        guest_ban_secs: 10,
        ..GuardConfig::default()
    };
    let guard = AbuseGuard::new(config);
    let ip = addr(14);
    let now = Instant::now();
    for _ in 0..4 {
        guard.check_rate_at(ip, false, now);
    }
    assert!(!guard.check_rate_at(ip, false, now + Duration::from_secs(9)).allowed);
    assert!(guard.check_rate_at(ip, false, now + Duration::from_secs(11)).allowed);
}

// ── Sweep ────────────────────────────────────────────────────────────────

#[test]
fn test_sweep_purges_expired_and_aged_records() {
    let guard = guard();
    let now = Instant::now();

    // Locked and expired by the time of the sweep
    for _ in 0..3 {
        guard.record_failure_at(addr(20), now);
    }
    // Single failure that ages past the horizon
    guard.record_failure_at(addr(21), now);
    // Fresh failure that must survive
    guard.record_failure_at(addr(22), now + Duration::from_secs(590));

    let report = guard.sweep_at(now + Duration::from_secs(601));
    assert_eq!(report.lockouts, 2);
    assert_eq!(guard.attempts(addr(22)), 1);
    assert_eq!(guard.attempts(addr(20)), 0);
}

#[test]
fn test_sweep_purges_idle_windows_but_keeps_bans() {
    let guard = guard();
    let now = Instant::now();
    guard.check_rate_at(addr(30), false, now);
    for _ in 0..4 {
        guard.check_rate_at(addr(31), false, now);
    }

    let report = guard.sweep_at(now + Duration::from_secs(2));
    assert_eq!(report.windows, 1);
    assert!(guard.guest_windows.is_blocked_at(addr(31), now + Duration::from_secs(2)));
}

// ── Command policy ───────────────────────────────────────────────────────

#[test]
fn test_destructive_command_denied_for_guest() {
    assert!(!is_command_safe("rm -rf /", false, &guests(), 200));
    assert_eq!(
        evaluate("rm -rf /", false, &guests(), 200),
        PolicyVerdict::Denied("rm")
    );
}

#[test]
fn test_allowlisted_command_passes_for_guest() {
    assert!(is_command_safe("ls -la", false, &guests(), 200));
    assert!(is_command_safe("  ECHO hello", false, &guests(), 200));
}

#[test]
fn test_chaining_denied_for_guest() {
    assert_eq!(
        evaluate("ls; rm -rf /", false, &guests(), 200),
        PolicyVerdict::DangerousPattern
    );
    assert!(!is_command_safe("ls && whoami", false, &guests(), 200));
    assert!(!is_command_safe("echo $(id)", false, &guests(), 200));
    assert!(!is_command_safe("echo `id`", false, &guests(), 200));
    assert!(!is_command_safe("ls ../", false, &guests(), 200));
    assert!(!is_command_safe("ls /proc/1", false, &guests(), 200));
    assert!(!is_command_safe("echo hi > out", false, &guests(), 200));
    assert!(!is_command_safe("ls | wc", false, &guests(), 200));
}

#[test]
fn test_line_breaks_denied_for_guest() {
    assert_eq!(
        evaluate("session\nid", false, &guests(), 200),
        PolicyVerdict::DangerousPattern
    );
    assert!(!is_command_safe("ls\rwhoami", false, &guests(), 200));
    assert!(!is_command_safe("echo \u{1b}[2J", false, &guests(), 200));
    assert!(is_command_safe("session\nid", true, &guests(), 200));
}

#[test]
fn test_denylist_checked_before_patterns() {
    // Shell interpreter prefix wins over the pipe pattern
    assert_eq!(
        evaluate("bash -c 'ls | wc'", false, &guests(), 200),
        PolicyVerdict::Denied("bash")
    );
}

#[test]
fn test_length_checked_first() {
    let long = format!("ls {}", "a".repeat(300));
    assert_eq!(evaluate(&long, false, &guests(), 200), PolicyVerdict::TooLong);
}

#[test]
fn test_unknown_command_not_allowlisted() {
    assert_eq!(
        evaluate("cat notes.txt", false, &guests(), 200),
        PolicyVerdict::NotAllowlisted
    );
    // `cd` is a builtin, not a guest command
    assert!(!is_command_safe("cd /tmp", false, &guests(), 200));
}

#[test]
fn test_authenticated_always_allowed() {
    assert!(is_command_safe("rm -rf /", true, &[], 200));
    assert!(is_command_safe("ls; cat /etc/passwd | grep root", true, &[], 200));
    let long = "x".repeat(1000);
    assert!(is_command_safe(&long, true, &[], 200));
}
