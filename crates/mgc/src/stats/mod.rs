//! Stats Module - Collection Statistics
//!
//! Every `run_cycle` call is bracketed by `cycle_started` and
//! `cycle_finished`. A single call may perform several attempts (retries
//! after insufficient space, or an extra cycle pulled forward by the heap
//! load check), so counts are kept both per call and per attempt.
//!
//! Metrics:
//! - Pause time per call (min, max, mean, percentiles)
//! - Attempts by kind, escalations, failures
//! - Words grown and released by the heap sizer

pub mod histogram;
pub mod timer;

pub use histogram::Histogram;
pub use timer::GcTimer;

use crate::driver::CollectionKind;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one `run_cycle` call did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Sequence number of the call
    pub cycle: u64,
    /// Kind the caller asked for
    pub requested: CollectionKind,
    /// Kind of the last attempt
    pub performed: CollectionKind,
    /// Words the caller needs to allocate
    pub words_needed: usize,
    /// Minor attempts performed
    pub minor_attempts: u32,
    /// Full attempts performed
    pub full_attempts: u32,
    /// A deferred full collection was picked up by this call
    pub escalated: bool,
    pub succeeded: bool,
    /// Words added to the heap during the call
    pub grown_words: usize,
    /// Words returned to the segment source during the call
    pub released_words: usize,
    /// Wall-clock pause
    pub duration: Duration,
}

impl CycleReport {
    pub fn attempts(&self) -> u32 {
        self.minor_attempts + self.full_attempts
    }
}

/// GcStats - statistics collector for the driver
pub struct GcStats {
    /// `run_cycle` calls
    cycles: AtomicU64,
    minor_attempts: AtomicU64,
    full_attempts: AtomicU64,
    escalations: AtomicU64,
    failures: AtomicU64,
    words_grown: AtomicU64,
    words_released: AtomicU64,
    /// Pause time per call, in nanoseconds
    pause_stats: Arc<Histogram>,
    last_report: Mutex<Option<CycleReport>>,
    start_time: Instant,
}

impl GcStats {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            minor_attempts: AtomicU64::new(0),
            full_attempts: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            words_grown: AtomicU64::new(0),
            words_released: AtomicU64::new(0),
            pause_stats: Arc::new(Histogram::new()),
            last_report: Mutex::new(None),
            start_time: Instant::now(),
        }
    }

    /// Start a call; returns its sequence number and timer
    pub fn cycle_started(&self) -> (u64, GcTimer) {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        (cycle, GcTimer::new())
    }

    /// Record a finished call
    pub fn cycle_finished(&self, report: CycleReport) {
        self.minor_attempts
            .fetch_add(u64::from(report.minor_attempts), Ordering::Relaxed);
        self.full_attempts
            .fetch_add(u64::from(report.full_attempts), Ordering::Relaxed);
        if report.escalated {
            self.escalations.fetch_add(1, Ordering::Relaxed);
        }
        if !report.succeeded {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.words_grown
            .fetch_add(report.grown_words as u64, Ordering::Relaxed);
        self.words_released
            .fetch_add(report.released_words as u64, Ordering::Relaxed);
        self.pause_stats
            .record(u64::try_from(report.duration.as_nanos()).unwrap_or(u64::MAX));

        *self.last_report.lock() = Some(report);
    }

    /// Number of `run_cycle` calls started
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Report of the most recent finished call
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().clone()
    }

    /// Get pause time histogram
    pub fn pause_histogram(&self) -> Arc<Histogram> {
        Arc::clone(&self.pause_stats)
    }

    /// Get summary statistics
    pub fn summary(&self) -> GcSummary {
        GcSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            minor_attempts: self.minor_attempts.load(Ordering::Relaxed),
            full_attempts: self.full_attempts.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            words_grown: self.words_grown.load(Ordering::Relaxed),
            words_released: self.words_released.load(Ordering::Relaxed),
            avg_pause_ms: self.pause_stats.mean() as f64 / 1_000_000.0,
            max_pause_ms: self.pause_stats.max() as f64 / 1_000_000.0,
            p99_pause_ms: self.pause_stats.p99() as f64 / 1_000_000.0,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.cycles.store(0, Ordering::Relaxed);
        self.minor_attempts.store(0, Ordering::Relaxed);
        self.full_attempts.store(0, Ordering::Relaxed);
        self.escalations.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.words_grown.store(0, Ordering::Relaxed);
        self.words_released.store(0, Ordering::Relaxed);
        self.pause_stats.clear();
        *self.last_report.lock() = None;
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GcSummary {
    pub cycles: u64,
    pub minor_attempts: u64,
    pub full_attempts: u64,
    pub escalations: u64,
    pub failures: u64,
    pub words_grown: u64,
    pub words_released: u64,
    /// Average pause time (ms)
    pub avg_pause_ms: f64,
    /// Max pause time (ms)
    pub max_pause_ms: f64,
    /// P99 pause time (ms), bucket upper bound
    pub p99_pause_ms: f64,
    /// Uptime (seconds)
    pub uptime_secs: u64,
}
