//! Monotonic time source.
//!
//! The core never reads the wall clock directly; every deadline
//! computation goes through a [`Clock`] trait so tests can inject a fake
//! source instead of sleeping real time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Microseconds since an unspecified, monotonic epoch.
pub type TimeTicks = u64;

/// A deadline expressed as an absolute [`TimeTicks`] value.
///
/// `INDEFINITE` disables the timeout entirely.
pub const INDEFINITE: u64 = u64::MAX;

/// A source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeTicks;
}

/// Production clock backed by [`std::time::Instant`].
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> TimeTicks {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// A clock whose value is advanced explicitly, for deterministic tests.
pub struct FakeClock {
    ticks: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock { ticks: AtomicU64::new(0) }
    }

    pub fn advance(&self, delta_micros: u64) {
        self.ticks.fetch_add(delta_micros, Ordering::SeqCst);
    }

    pub fn set(&self, value: TimeTicks) {
        self.ticks.store(value, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> TimeTicks {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// Computes `now + timeout`, clamping overflow to [`INDEFINITE`].
///
/// `timeout == INDEFINITE` short-circuits to `INDEFINITE` regardless of
/// `now`, since an indefinite wait never times out.
pub fn checked_deadline(now: TimeTicks, timeout: u64) -> TimeTicks {
    if timeout == INDEFINITE {
        return INDEFINITE;
    }
    now.checked_add(timeout).unwrap_or(INDEFINITE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indefinite_timeout_stays_indefinite() {
        assert_eq!(checked_deadline(1_000, INDEFINITE), INDEFINITE);
    }

    #[test]
    fn overflow_clamps_to_indefinite() {
        assert_eq!(checked_deadline(u64::MAX - 1, 10), INDEFINITE);
    }

    #[test]
    fn normal_addition() {
        assert_eq!(checked_deadline(100, 50), 150);
    }

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new();
        assert_eq!(clock.now(), 0);
        clock.advance(250);
        assert_eq!(clock.now(), 250);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }
}
