//! Clock sources
//!
//! Every "is this in the future" decision in the engine goes through a
//! [`Clock`], so tests can pin time instead of racing the wall clock.

use chrono::{DateTime, Duration, Utc};
use std::sync::{PoisonError, RwLock};

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current time in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by [`Utc::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward (or backward, for negative durations)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}
