//! Injectable wall-clock source.
//!
//! Every expiry decision in the engine (pairing codes, bearer tokens) is made
//! against a [`Clock`] rather than by calling `SystemTime::now()` directly.
//! Production code uses [`SystemClock`]; tests use [`ManualClock`] and advance
//! it explicitly, so a "24 hours later" test runs in microseconds.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns the current time as milliseconds since the Unix epoch.
    ///
    /// This is the representation used for every `timestamp` field on the wire.
    fn now_millis(&self) -> u64 {
        unix_millis(self.now())
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// hand another to the store under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Creates a clock frozen at a fixed, arbitrary instant (2024-01-01T00:00:00Z).
    pub fn fixed() -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(1_704_067_200))
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Converts a `SystemTime` into milliseconds since the Unix epoch.
///
/// Times before the epoch clamp to `0`.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_does_not_move_on_its_own() {
        let clock = ManualClock::fixed();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_manual_clock_advance_is_visible_through_clones() {
        // Arrange
        let clock = ManualClock::fixed();
        let shared = clock.clone();
        let before = shared.now();

        // Act
        clock.advance(Duration::from_secs(90));

        // Assert
        assert_eq!(shared.now(), before + Duration::from_secs(90));
    }

    #[test]
    fn test_now_millis_matches_fixed_start() {
        let clock = ManualClock::fixed();
        assert_eq!(clock.now_millis(), 1_704_067_200_000);
    }

    #[test]
    fn test_unix_millis_clamps_pre_epoch_to_zero() {
        let before_epoch = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(unix_millis(before_epoch), 0);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
