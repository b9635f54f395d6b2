//! Time source abstraction for deterministic runs.
//!
//! The run controller measures wall-time deltas and agent latency through a
//! `TimeSource`, so production runs use the real clock while tests use a
//! simulated clock that only moves when told to.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over time operations.
pub trait TimeSource {
    /// Get the current time in microseconds since Unix epoch.
    fn now_us(&self) -> u64;

    /// Get the current time in whole seconds since Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_us() / 1_000_000
    }
}

/// Real time source using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[allow(clippy::cast_possible_truncation)] // Microseconds fit in u64 for ~584k years
    fn now_us(&self) -> u64 {
        // A clock set before 1970 reads as the epoch rather than failing the run.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_micros() as u64)
    }
}

/// A simulated time source for deterministic testing.
///
/// Time only advances when explicitly told to. Uses [`Cell`] for interior
/// mutability, so it is single-threaded only; every run owns its own clock.
#[derive(Debug)]
pub struct SimulatedTimeSource {
    current_time_us: Cell<u64>,
}

impl SimulatedTimeSource {
    /// Create a new simulated time source at the given time.
    #[must_use]
    pub const fn new(initial_time_us: u64) -> Self {
        Self {
            current_time_us: Cell::new(initial_time_us),
        }
    }

    /// Start at `1_700_000_000` seconds (November 2023).
    #[must_use]
    pub const fn default_start() -> Self {
        Self::new(1_700_000_000_000_000)
    }

    /// Advance time by the given number of microseconds (saturating).
    pub fn advance(&self, us: u64) {
        let current = self.current_time_us.get();
        self.current_time_us.set(current.saturating_add(us));
    }

    /// Get the current simulated time without advancing it.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current_time_us.get()
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now_us(&self) -> u64 {
        self.current_time_us.get()
    }
}

impl Default for SimulatedTimeSource {
    fn default() -> Self {
        Self::default_start()
    }
}
