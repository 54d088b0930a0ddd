//! GC Timer - Timing Utilities
//!
//! Wall-clock timing for collection cycles and their phases.

use std::time::{Duration, Instant};

/// GcTimer - measures one cycle or phase
#[derive(Debug, Clone, Copy)]
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    /// Start a new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed nanoseconds
    pub fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Get elapsed microseconds
    pub fn elapsed_us(&self) -> u64 {
        u64::try_from(self.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Get elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed time, restarting the timer
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now - self.start;
        self.start = now;
        lap
    }
}

impl Default for GcTimer {
    fn default() -> Self {
        Self::new()
    }
}
