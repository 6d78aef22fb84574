//! Shared utilities: time source and small helpers.

use std::sync::atomic::{AtomicI64, Ordering};

pub const SECONDS_PER_DAY: i64 = 86400;

/// Source of wall-clock time in unix seconds.
///
/// Injected into the licensor so tests can move time forward (trial expiry)
/// or backward (clock rollback) without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, timestamp: i64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Convert a day count into seconds, or `None` on overflow.
pub fn days(n: i64) -> Option<i64> {
    n.checked_mul(SECONDS_PER_DAY)
}
