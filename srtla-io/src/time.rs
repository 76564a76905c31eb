//! Monotonic timing for the sender
//!
//! Path timeouts, zombie lifetimes and keepalive cadence are all measured
//! against a monotonic clock. `Timestamp` wraps `Instant` with the
//! millisecond-oriented helpers the engine uses; `Timer` drives the periodic
//! housekeeping slots in the event loop.

use std::ops::Sub;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// A point on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Instant);

impl Timestamp {
    #[inline]
    pub fn now() -> Self {
        Timestamp(Instant::now())
    }

    /// Milliseconds elapsed since this timestamp.
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Milliseconds from `earlier` to this timestamp; zero if `earlier` is
    /// actually later.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0
            .checked_duration_since(earlier.0)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// A timestamp `duration` in the past, clamped to the earliest
    /// representable instant. Used to backdate activity on a failed path.
    pub fn backdated(duration: Duration) -> Self {
        let now = Instant::now();
        Timestamp(now.checked_sub(duration).unwrap_or(now))
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.0.saturating_duration_since(other.0)
    }
}

/// Monotonic milliseconds since process start. Opaque to the peer; used to
/// stamp keepalive frames.
pub fn monotonic_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Fires at a fixed interval, polled from the event loop.
pub struct Timer {
    interval: Duration,
    last_fire: Timestamp,
}

impl Timer {
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Timestamp::now(),
        }
    }

    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    pub fn reset(&mut self) {
        self.last_fire = Timestamp::now();
    }

    /// Fire the timer if its interval has elapsed, returning whether it did.
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.reset();
            true
        } else {
            false
        }
    }
}
