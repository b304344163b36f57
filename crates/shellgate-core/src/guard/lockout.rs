//! Failed-authentication tracking per network address

use std::time::{Duration, Instant};

/// Failed-authentication record for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutRecord {
    /// Consecutive failed attempts since the record was created
    pub attempts: u32,
    /// Set once `attempts` reaches the threshold
    pub locked_until: Option<Instant>,
    /// When the first failure in this record happened
    pub first_attempt: Instant,
}

impl LockoutRecord {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            attempts: 0,
            locked_until: None,
            first_attempt: now,
        }
    }

    /// Count one failure, arming the lock when the threshold is reached.
    pub(crate) fn fail(&mut self, now: Instant, threshold: u32, lockout: Duration) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= threshold {
            self.locked_until = Some(now + lockout);
            return true;
        }
        false
    }

    /// Whether the lock window is still running.
    pub fn is_locked_at(&self, now: Instant) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    /// Lock expired, or the record outlived the cleanup horizon.
    pub(crate) fn is_stale(&self, now: Instant, horizon: Duration) -> bool {
        let expired = matches!(self.locked_until, Some(until) if now >= until);
        expired || now.saturating_duration_since(self.first_attempt) > horizon
    }

    /// Time left on the lock, zero when unlocked.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.locked_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Lock state reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutInfo {
    /// Whether the address is currently locked
    pub locked: bool,
    /// Time left on the lock
    pub remaining: Duration,
}

impl LockoutInfo {
    /// Remaining lock time in milliseconds, as reported on the wire.
    pub fn remaining_ms(&self) -> u64 {
        self.remaining.as_millis().min(u128::from(u64::MAX)) as u64
    }

    /// Remaining lock time rounded up to whole minutes.
    pub fn remaining_minutes(&self) -> u64 {
        self.remaining.as_secs().div_ceil(60)
    }
}
