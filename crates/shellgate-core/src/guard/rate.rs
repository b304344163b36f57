//! Fixed-window request counting per network address
//!
//! Used twice: guest command throttling (with ban escalation) and the
//! `/auth` HTTP limiter (plain rejection).

use dashmap::DashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Limits for one fixed-window policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
    /// How long an address stays blocked after exceeding the window
    pub block_for: Duration,
    /// Whether exceeding the window should terminate the caller's connection
    pub disconnect: bool,
}

/// Counter state for one address.
#[derive(Debug, Clone)]
pub struct RateWindow {
    /// Requests counted in the current window
    pub count: u32,
    /// When the current window ends
    pub resets_at: Instant,
    /// Active block, if any
    pub blocked_until: Option<Instant>,
}

impl RateWindow {
    fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            resets_at: now + window,
            blocked_until: None,
        }
    }

    fn is_blocked_at(&self, now: Instant) -> bool {
        matches!(self.blocked_until, Some(until) if now < until)
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether this request may proceed
    pub allowed: bool,
    /// Requests left in the window
    pub remaining: u32,
    /// Whether the address is under a block
    pub blocked: bool,
    /// The caller should drop the connection, not only the request
    pub should_disconnect: bool,
    /// Time until the block (or window) lifts
    pub retry_after: Duration,
}

impl RateDecision {
    /// Decision for traffic that is not metered.
    pub fn unmetered() -> Self {
        Self {
            allowed: true,
            remaining: u32::MAX,
            blocked: false,
            should_disconnect: false,
            retry_after: Duration::ZERO,
        }
    }
}

/// Fixed-window counters keyed by address.
#[derive(Debug)]
pub struct RateWindows {
    policy: WindowPolicy,
    windows: DashMap<IpAddr, RateWindow>,
}

impl RateWindows {
    /// Create an empty set of windows for `policy`.
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    /// The policy these windows enforce.
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Count one request from `addr`.
    pub fn hit(&self, addr: IpAddr) -> RateDecision {
        self.hit_at(addr, Instant::now())
    }

    pub(crate) fn hit_at(&self, addr: IpAddr, now: Instant) -> RateDecision {
        let policy = self.policy;
        let mut entry = self
            .windows
            .entry(addr)
            .or_insert_with(|| RateWindow::new(now, policy.window));
        let record = entry.value_mut();

        if let Some(until) = record.blocked_until {
            if now < until {
                return RateDecision {
                    allowed: false,
                    remaining: 0,
                    blocked: true,
                    should_disconnect: false,
                    retry_after: until - now,
                };
            }
            // Block served; start over with a fresh window.
            *record = RateWindow::new(now, policy.window);
        }

        if now >= record.resets_at {
            record.count = 0;
            record.resets_at = now + policy.window;
        }

        record.count = record.count.saturating_add(1);

        if record.count > policy.max_requests {
            record.blocked_until = Some(now + policy.block_for);
            return RateDecision {
                allowed: false,
                remaining: 0,
                blocked: true,
                should_disconnect: policy.disconnect,
                retry_after: policy.block_for,
            };
        }

        RateDecision {
            allowed: true,
            remaining: policy.max_requests - record.count,
            blocked: false,
            should_disconnect: false,
            retry_after: record.resets_at.saturating_duration_since(now),
        }
    }

    /// Whether `addr` is under an active block.
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        self.is_blocked_at(addr, Instant::now())
    }

    pub(crate) fn is_blocked_at(&self, addr: IpAddr, now: Instant) -> bool {
        self.windows
            .get(&addr)
            .map(|w| w.is_blocked_at(now))
            .unwrap_or(false)
    }

    /// Drop windows whose period and block have both elapsed.
    pub fn purge_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now < w.resets_at || w.is_blocked_at(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked addresses.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no address is tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
