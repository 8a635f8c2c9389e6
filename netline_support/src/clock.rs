//! A mockable time source.
//!
//! `Endpoint::sync` threads an explicit `now: Instant` through rather
//! than calling `Instant::now()` deep inside connection logic. `Clock`
//! generalizes that pattern so the reliable-resend and keep-alive
//! timers in `netline` can be driven by a `ManualClock` in tests
//! instead of real wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Produces the current instant. Implementations must be monotonic.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock that only advances when told to. Holds a fixed epoch plus
/// an atomically-tracked offset so it can be shared behind a plain `&`
/// reference across a simulated multi-peer test.
pub struct ManualClock {
    epoch: Instant,
    offset_millis: AtomicU64,
}

impl ManualClock {
    #[inline]
    pub fn new() -> Self {
        ManualClock {
            epoch: Instant::now(),
            offset_millis: AtomicU64::new(0),
        }
    }

    /// Advances the clock by `duration`.
    #[inline]
    pub fn advance(&self, duration: Duration) {
        self.offset_millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Instant {
        self.epoch + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}
