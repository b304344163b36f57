//! Abuse guard
//!
//! Provides:
//! - Authentication lockout per network address
//! - Guest request-rate windows with ban escalation
//! - Guest command policy (`is_command_safe`)
//! - Periodic purge of stale records
//!
//! Pure state and policy; the only I/O is the optional sweeper task.

mod lockout;
mod policy;
mod rate;

#[cfg(test)]
mod tests;

pub use lockout::{LockoutInfo, LockoutRecord};
pub use policy::{evaluate, is_command_safe, PolicyVerdict, DENIED_PREFIXES};
pub use rate::{RateDecision, RateWindow, RateWindows, WindowPolicy};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Upper bound accepted for the guest ban.
pub const MAX_GUEST_BAN: Duration = Duration::from_secs(7 * 24 * 3600);

/// Guard thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Failures before an address is locked
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Lock duration in seconds
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
    /// Sweep period in seconds; also the maximum age of a lockout record
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Guest window length in milliseconds
    #[serde(default = "default_guest_window_ms")]
    pub guest_window_ms: u64,
    /// Guest requests allowed per window
    #[serde(default = "default_guest_max_requests")]
    pub guest_max_requests: u32,
    /// Guest ban after exceeding the window, in seconds
    #[serde(default = "default_guest_ban_secs")]
    pub guest_ban_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_lockout_secs() -> u64 {
    300
}
fn default_cleanup_interval_secs() -> u64 {
    600
}
fn default_guest_window_ms() -> u64 {
    1000
}
fn default_guest_max_requests() -> u32 {
    3
}
fn default_guest_ban_secs() -> u64 {
    3600
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lockout_secs: default_lockout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            guest_window_ms: default_guest_window_ms(),
            guest_max_requests: default_guest_max_requests(),
            guest_ban_secs: default_guest_ban_secs(),
        }
    }
}

impl GuardConfig {
    /// Lock duration
    pub fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }

    /// Sweep period and record horizon
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Guest window policy, with the ban clamped to [`MAX_GUEST_BAN`].
    pub fn guest_policy(&self) -> WindowPolicy {
        WindowPolicy {
            max_requests: self.guest_max_requests,
            window: Duration::from_millis(self.guest_window_ms),
            block_for: Duration::from_secs(self.guest_ban_secs).min(MAX_GUEST_BAN),
            disconnect: true,
        }
    }
}

/// Counts purged by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Lockout records removed
    pub lockouts: usize,
    /// Rate windows removed
    pub windows: usize,
}

/// Tracks failed logins and guest request rates per address.
#[derive(Debug)]
pub struct AbuseGuard {
    config: GuardConfig,
    lockouts: DashMap<IpAddr, LockoutRecord>,
    guest_windows: RateWindows,
}

impl AbuseGuard {
    /// Create a guard with the given thresholds.
    pub fn new(config: GuardConfig) -> Self {
        let guest_windows = RateWindows::new(config.guest_policy());
        Self {
            config,
            lockouts: DashMap::new(),
            guest_windows,
        }
    }

    /// The configured thresholds.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    // ── Lockout ──────────────────────────────────────────────────────────

    /// Count a failed authentication from `addr`.
    pub fn record_failure(&self, addr: IpAddr) -> LockoutRecord {
        self.record_failure_at(addr, Instant::now())
    }

    pub(crate) fn record_failure_at(&self, addr: IpAddr, now: Instant) -> LockoutRecord {
        let mut entry = self
            .lockouts
            .entry(addr)
            .or_insert_with(|| LockoutRecord::new(now));
        let record = entry.value_mut();

        // A served lock starts a fresh count.
        if matches!(record.locked_until, Some(until) if now >= until) {
            *record = LockoutRecord::new(now);
        }

        if record.fail(now, self.config.max_attempts, self.config.lockout()) {
            warn!(
                ip = %addr,
                attempts = record.attempts,
                lockout_secs = self.config.lockout_secs,
                "Address locked after repeated authentication failures"
            );
        }
        record.clone()
    }

    /// Whether `addr` is locked. Expired records are dropped on the way.
    pub fn is_locked(&self, addr: IpAddr) -> bool {
        self.is_locked_at(addr, Instant::now())
    }

    pub(crate) fn is_locked_at(&self, addr: IpAddr, now: Instant) -> bool {
        let expired = match self.lockouts.get(&addr) {
            None => return false,
            Some(record) => match record.locked_until {
                Some(until) if now >= until => true,
                Some(_) => return true,
                None => return false,
            },
        };
        if expired {
            self.lockouts
                .remove_if(&addr, |_, r| !r.is_locked_at(now));
        }
        false
    }

    /// Forget `addr` after a successful authentication.
    pub fn clear(&self, addr: IpAddr) {
        self.lockouts.remove(&addr);
    }

    /// Failed attempts currently counted for `addr`.
    pub fn attempts(&self, addr: IpAddr) -> u32 {
        self.lockouts.get(&addr).map(|r| r.attempts).unwrap_or(0)
    }

    /// Attempts left before `addr` is locked.
    pub fn remaining_attempts(&self, addr: IpAddr) -> u32 {
        self.config.max_attempts.saturating_sub(self.attempts(addr))
    }

    /// Lock state for `addr`, `None` when no lock was ever armed.
    pub fn lockout_info(&self, addr: IpAddr) -> Option<LockoutInfo> {
        self.lockout_info_at(addr, Instant::now())
    }

    pub(crate) fn lockout_info_at(&self, addr: IpAddr, now: Instant) -> Option<LockoutInfo> {
        let record = self.lockouts.get(&addr)?;
        record.locked_until?;
        let remaining = record.remaining_at(now);
        Some(LockoutInfo {
            locked: !remaining.is_zero(),
            remaining,
        })
    }

    /// Number of addresses currently locked.
    pub fn locked_count(&self) -> usize {
        let now = Instant::now();
        self.lockouts
            .iter()
            .filter(|entry| entry.value().is_locked_at(now))
            .count()
    }

    // ── Rate windows ─────────────────────────────────────────────────────

    /// Meter one request. Authenticated traffic is never metered.
    pub fn check_rate(&self, addr: IpAddr, authenticated: bool) -> RateDecision {
        self.check_rate_at(addr, authenticated, Instant::now())
    }

    pub(crate) fn check_rate_at(
        &self,
        addr: IpAddr,
        authenticated: bool,
        now: Instant,
    ) -> RateDecision {
        if authenticated {
            return RateDecision::unmetered();
        }
        let decision = self.guest_windows.hit_at(addr, now);
        if decision.should_disconnect {
            warn!(
                ip = %addr,
                ban_secs = decision.retry_after.as_secs(),
                "Guest rate limit exceeded, address banned"
            );
        }
        decision
    }

    /// Whether `addr` is serving a guest ban.
    pub fn is_banned(&self, addr: IpAddr) -> bool {
        self.guest_windows.is_blocked(addr)
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    /// Purge expired or aged-out lockouts and elapsed rate windows.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> SweepReport {
        let horizon = self.config.cleanup_interval();
        let before = self.lockouts.len();
        self.lockouts.retain(|_, r| !r.is_stale(now, horizon));
        SweepReport {
            lockouts: before.saturating_sub(self.lockouts.len()),
            windows: self.guest_windows.purge_at(now),
        }
    }

    /// Run [`sweep`](Self::sweep) every cleanup interval until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            let period = guard.config.cleanup_interval();
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let report = guard.sweep();
                        if report.lockouts > 0 || report.windows > 0 {
                            info!(
                                lockouts = report.lockouts,
                                windows = report.windows,
                                "Purged expired abuse records"
                            );
                        }
                    }
                }
            }
        })
    }
}
