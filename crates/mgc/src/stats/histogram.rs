//! Histogram - Pause Time Histogram
//!
//! Logarithmic buckets for cycle pause times. Bucket `b` holds values in
//! `[2^(b-1), 2^b)`; bucket 0 holds zero. Percentiles report the upper
//! bound of the bucket they land in.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram - pause time distribution
pub struct Histogram {
    /// Bucket counts
    buckets: Mutex<BTreeMap<u32, u64>>,

    /// Total count
    count: AtomicU64,

    /// Sum of all values
    sum: AtomicU64,

    /// Min value
    min: AtomicU64,

    /// Max value
    max: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Record value
    pub fn record(&self, value: u64) {
        *self.buckets.lock().entry(bucket_of(value)).or_insert(0) += 1;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Upper bound of the bucket holding the `p` quantile
    pub fn percentile(&self, p: f64) -> u64 {
        let buckets = self.buckets.lock();
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target = ((total as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0;
        for (&bucket, &count) in buckets.iter() {
            cumulative += count;
            if cumulative >= target {
                return bucket_upper_bound(bucket);
            }
        }

        buckets
            .last_key_value()
            .map_or(0, |(&bucket, _)| bucket_upper_bound(bucket))
    }

    /// Get P50 (median)
    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    /// Get P99
    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }

    pub fn mean(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.sum.load(Ordering::Relaxed) / count
    }

    pub fn min(&self) -> u64 {
        match self.min.load(Ordering::Relaxed) {
            u64::MAX => 0,
            min => min,
        }
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Clear histogram
    pub fn clear(&self) {
        self.buckets.lock().clear();
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_of(value: u64) -> u32 {
    u64::BITS - value.leading_zeros()
}

fn bucket_upper_bound(bucket: u32) -> u64 {
    match bucket {
        0 => 0,
        b => u64::MAX >> (u64::BITS - b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_histogram() {
        let h = Histogram::new();
        assert_eq!(h.count(), 0);
        assert_eq!(h.min(), 0);
        assert_eq!(h.mean(), 0);
        assert_eq!(h.p99(), 0);
    }

    #[test]
    fn test_record_and_summary() {
        let h = Histogram::new();
        for value in [3, 5, 100, 1000] {
            h.record(value);
        }
        assert_eq!(h.count(), 4);
        assert_eq!(h.min(), 3);
        assert_eq!(h.max(), 1000);
        assert_eq!(h.mean(), 277);
        // 5 lives in bucket [4, 8)
        assert_eq!(h.p50(), 7);
        // 1000 lives in bucket [512, 1024)
        assert_eq!(h.percentile(1.0), 1023);
    }

    #[test]
    fn test_clear() {
        let h = Histogram::new();
        h.record(42);
        h.clear();
        assert_eq!(h.count(), 0);
        assert_eq!(h.max(), 0);
    }
}
