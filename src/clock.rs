//! `indexed_at` freshness (spec §4.3, §9 Open Question) is read from an injectable clock
//! rather than calling `SystemTime::now()` inline, so refresh-interval arithmetic in tests is
//! deterministic instead of sleep-based. Production wiring uses `RealClock`; this is the
//! implementation's answer to the spec's open question about replica clock skew -- no
//! cross-replica coordination is attempted, only a seam that lets the behavior be tested.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the wall-clock seconds stamped into `indexed_at`.
pub trait SystemClock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// The production clock: whole seconds since the Unix epoch.
#[derive(Default)]
pub struct RealClock;

impl SystemClock for RealClock {
    fn now_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs() as i64
    }
}

/// A settable clock for tests that exercise refresh-interval coalescing (spec §8 scenario 5)
/// without sleeping.
pub struct FakeClock {
    now: AtomicI64,
}

impl FakeClock {
    pub fn new(start_secs: i64) -> Self {
        Self {
            now: AtomicI64::new(start_secs),
        }
    }

    pub fn set(&self, secs: i64) {
        self.now.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl SystemClock for FakeClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new(100);
        assert_eq!(100, clock.now_secs());
        clock.advance(30);
        assert_eq!(130, clock.now_secs());
        clock.set(0);
        assert_eq!(0, clock.now_secs());
    }
}
