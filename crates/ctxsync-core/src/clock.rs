//! Time source abstraction.
//!
//! Change timestamps and cache freshness are both expressed as fractional
//! Unix seconds read from a [`Clock`]. Production code uses [`SystemClock`];
//! tests drive [`ManualClock`] forward to exercise expiry deterministically.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// A source of wall-clock time in fractional Unix seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`chrono::Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock frozen at `start` seconds.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_secs_f64();
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: f64) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000_000.0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800.0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100.0);
        assert!((clock.now() - 100.0).abs() < f64::EPSILON);
        clock.advance(Duration::from_millis(2500));
        assert!((clock.now() - 102.5).abs() < 1e-9);
    }

    #[test]
    fn manual_clock_set() {
        let clock = ManualClock::default();
        clock.set(42.0);
        assert!((clock.now() - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn usable_as_shared_clock() {
        let clock: SharedClock = Arc::new(ManualClock::new(7.0));
        assert!((clock.now() - 7.0).abs() < f64::EPSILON);
    }
}
