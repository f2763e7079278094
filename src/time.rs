//! Injected time sources.
//!
//! Clock-gate phase and timing-event timestamps must be reproducible under
//! test, so the kernel never reads the system clock directly. Hosts supply
//! a [`TimeProvider`]; tests use [`FixedTimeProvider`] and advance it by
//! hand.

use std::cell::Cell;
use std::time::Instant;

use crate::types::TimeMs;

/// A monotonic source of milliseconds.
///
/// The absolute origin is provider-defined; the kernel only ever works
/// with differences and session-relative values.
pub trait TimeProvider {
    /// Current time in milliseconds.
    fn now_ms(&self) -> TimeMs;
}

/// Production provider backed by a monotonic [`Instant`].
pub struct SystemTimeProvider {
    origin: Instant,
}

impl SystemTimeProvider {
    /// Creates a provider whose zero point is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now_ms(&self) -> TimeMs {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A manually-advanced provider for deterministic tests and replay.
pub struct FixedTimeProvider {
    now: Cell<TimeMs>,
}

impl FixedTimeProvider {
    /// Creates a provider frozen at `start_ms`.
    pub fn new(start_ms: TimeMs) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    /// Advances the clock by `delta_ms`.
    pub fn advance(&self, delta_ms: TimeMs) {
        self.now.set(self.now.get() + delta_ms);
    }

    /// Jumps the clock to an absolute value.
    pub fn set(&self, now_ms: TimeMs) {
        self.now.set(now_ms);
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now_ms(&self) -> TimeMs {
        self.now.get()
    }
}
