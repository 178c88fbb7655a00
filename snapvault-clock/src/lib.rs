//! Clock abstraction for snapvault.
//!
//! Every time decision in the repository (snapshot start and end times,
//! future-dated filtering, retention windows) reads an injected [`Clock`]
//! so tests can pin or step time deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for reading the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time as signed Unix seconds.
    fn now_unix(&self) -> i64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_unix(&self) -> i64 {
        (**self).now_unix()
    }
}

/// Real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        }
    }
}

/// Mock clock that reports a settable timestamp.
#[derive(Debug, Default)]
pub struct MockClock {
    timestamp: AtomicI64,
}

impl MockClock {
    /// Create a mock clock fixed at `timestamp`.
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp: AtomicI64::new(timestamp),
        }
    }

    /// Move the clock to `timestamp`.
    pub fn set(&self, timestamp: i64) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.timestamp.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_unix(&self) -> i64 {
        self.timestamp.load(Ordering::SeqCst)
    }
}

/// Mock clock that advances by a fixed step after every read.
///
/// Useful when a code path reads the clock more than once and each read
/// must observe time passing (e.g. start and end of a copy).
#[derive(Debug)]
pub struct SteppingClock {
    timestamp: AtomicI64,
    step: i64,
}

impl SteppingClock {
    /// Start at `timestamp`, advancing by `step` on each read.
    pub fn new(timestamp: i64, step: i64) -> Self {
        Self {
            timestamp: AtomicI64::new(timestamp),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_unix(&self) -> i64 {
        self.timestamp.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_fixed() {
        let clock = MockClock::new(1_700_000_000);
        assert_eq!(clock.now_unix(), 1_700_000_000);
        assert_eq!(clock.now_unix(), 1_700_000_000);
    }

    #[test]
    fn test_mock_clock_set_and_advance() {
        let clock = MockClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_unix(), 150);
        clock.set(10);
        assert_eq!(clock.now_unix(), 10);
    }

    #[test]
    fn test_mock_clock_default_is_epoch() {
        assert_eq!(MockClock::default().now_unix(), 0);
    }

    #[test]
    fn test_system_clock_reasonable() {
        let now = SystemClock.now_unix();
        // 2020-01-01 .. 2100-01-01
        assert!(now > 1_577_836_800);
        assert!(now < 4_102_444_800);
    }

    #[test]
    fn test_stepping_clock() {
        let clock = SteppingClock::new(1000, 3);
        assert_eq!(clock.now_unix(), 1000);
        assert_eq!(clock.now_unix(), 1003);
        assert_eq!(clock.now_unix(), 1006);
    }

    #[test]
    fn test_clock_by_reference_and_trait_object() {
        let clock = MockClock::new(42);
        let by_ref: &dyn Clock = &clock;
        assert_eq!((&clock).now_unix(), 42);
        assert_eq!(by_ref.now_unix(), 42);
    }
}
