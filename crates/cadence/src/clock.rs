//! Time source abstraction.
//!
//! The scheduler never calls `Utc::now()` directly; it reads time through a
//! [`Clock`] so tests can substitute a controlled source.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Source of "now" for the scheduler.
pub trait Clock: Send + Sync + 'static {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock anchored to a fixed base instant that advances with tokio's
/// runtime clock.
///
/// Under `#[tokio::test(start_paused = true)]` the runtime clock is virtual,
/// so this clock moves in lockstep with `tokio::time::sleep` and tests become
/// fully deterministic. Must be constructed inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl VirtualClock {
    /// Anchor the clock at `base`.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed =
            chrono::Duration::from_std(self.started.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.base + elapsed
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.lock();
        *guard += delta;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}
