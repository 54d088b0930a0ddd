//! Configuration Module - Heap Tuning Parameters
//!
//! Manages all tuning parameters for MGC. Every size here is in machine
//! words, the unit the heap spaces are measured in.
//!
//! The configuration is immutable once a collector is built: the driver, the
//! heap sizer and the scheduler each hold a shared reference to the same
//! `TuningConfig`.

use crate::heap::SpaceKind;
use serde::{Deserialize, Serialize};

/// Tuning parameters for heap sizing and collection scheduling
///
/// Mutable and immutable partitions are tuned separately. "Free" targets are
/// what a full collection tries to leave free; "min free" thresholds are the
/// lower bar a minor collection must clear.
///
/// # Examples
///
/// ```rust
/// use mgc::TuningConfig;
///
/// // Use default configuration
/// let config = TuningConfig::default();
///
/// // Small heap for an embedded runtime
/// let config = TuningConfig {
///     mutable_segment_words: 256 * 1024,
///     immutable_segment_words: 256 * 1024,
///     gc_threads: 2,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Growth increment for the immutable partition
    ///
    /// Default: 1Mi words
    pub immutable_segment_words: usize,

    /// Growth increment for the mutable partition
    ///
    /// Default: 1Mi words
    pub mutable_segment_words: usize,

    /// Free immutable space a full collection aims to leave
    ///
    /// Default: 1Mi words
    pub immutable_free_words: usize,

    /// Free mutable space a full collection aims to leave
    ///
    /// Default: 1Mi words
    pub mutable_free_words: usize,

    /// Free immutable space a minor collection must leave
    ///
    /// Default: 256Ki words
    pub immutable_min_free_words: usize,

    /// Free mutable space a minor collection must leave
    ///
    /// Default: 256Ki words
    pub mutable_min_free_words: usize,

    /// Smallest segment request worth retrying after a refusal
    ///
    /// A refused request is halved until it drops to this size.
    /// Default: 64Ki words
    pub growth_floor_words: usize,

    /// Growth requests are rounded up to a multiple of this
    ///
    /// Must be a power of two. Matches one bitmap word.
    /// Default: 64 words
    pub growth_granularity_words: usize,

    /// One extra increment is added per this many existing segments
    ///
    /// Keeps the segment count down once a partition has grown several times.
    /// Default: 3
    pub segments_per_extra_increment: usize,

    /// Resident heap load (percent of physical memory) above which a
    /// deferred full collection runs immediately
    ///
    /// Default: 80
    pub heap_load_threshold_percent: usize,

    /// Consecutive re-collections of one generation before it is merged anyway
    ///
    /// Default: 3
    pub generation_cap: u32,

    /// Worker threads in the task farm
    ///
    /// Default: min(4, max(1, cpus / 2))
    pub gc_threads: usize,

    /// Queued tasks per phase before the submitter runs work inline
    ///
    /// Default: 100
    pub task_queue_depth: usize,

    /// Allow the heap to grow
    ///
    /// Disabled only for debugging.
    /// Default: true
    pub allow_growth: bool,

    /// Allow empty segments to be returned after a full collection
    ///
    /// Default: true
    pub allow_shrink: bool,

    /// Hard cap on the words the default segment source will map
    ///
    /// Default: None (limited only by the OS)
    pub max_heap_words: Option<usize>,

    /// Enable verbose GC event output
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();

        TuningConfig {
            // Growth increments
            immutable_segment_words: MI_WORDS,
            mutable_segment_words: MI_WORDS,

            // Full-collection targets
            immutable_free_words: MI_WORDS,
            mutable_free_words: MI_WORDS,

            // Minor-collection thresholds
            immutable_min_free_words: 256 * KI_WORDS,
            mutable_min_free_words: 256 * KI_WORDS,

            // Growth shaping
            growth_floor_words: 64 * KI_WORDS,
            growth_granularity_words: 64,
            segments_per_extra_increment: 3,

            // Scheduling
            heap_load_threshold_percent: 80,
            generation_cap: 3,

            // Threading
            gc_threads: (num_cpus / 2).clamp(1, 4),
            task_queue_depth: 100,

            // Debug
            allow_growth: true,
            allow_shrink: true,
            max_heap_words: None,
            verbose: false,
        }
    }
}

impl TuningConfig {
    /// Validate configuration
    ///
    /// Checks if all values are in valid ranges.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mgc::TuningConfig;
    ///
    /// let config = TuningConfig {
    ///     mutable_segment_words: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.immutable_segment_words == 0 || self.mutable_segment_words == 0 {
            return Err(ConfigError::InvalidSegmentSize(
                "segment increments must be > 0".to_string(),
            ));
        }

        if self.immutable_min_free_words > self.immutable_free_words {
            return Err(ConfigError::InvalidFreeTarget(
                "immutable_min_free_words cannot exceed immutable_free_words".to_string(),
            ));
        }

        if self.mutable_min_free_words > self.mutable_free_words {
            return Err(ConfigError::InvalidFreeTarget(
                "mutable_min_free_words cannot exceed mutable_free_words".to_string(),
            ));
        }

        if !self.growth_granularity_words.is_power_of_two() {
            return Err(ConfigError::InvalidGrowth(
                "growth_granularity_words must be a power of two".to_string(),
            ));
        }

        if self.segments_per_extra_increment == 0 {
            return Err(ConfigError::InvalidGrowth(
                "segments_per_extra_increment must be > 0".to_string(),
            ));
        }

        if self.heap_load_threshold_percent == 0 || self.heap_load_threshold_percent > 100 {
            return Err(ConfigError::InvalidThreshold(
                "heap_load_threshold_percent must be between 1 and 100".to_string(),
            ));
        }

        if self.gc_threads == 0 {
            return Err(ConfigError::InvalidGcThreads(
                "gc_threads must be > 0".to_string(),
            ));
        }

        if self.task_queue_depth == 0 {
            return Err(ConfigError::InvalidGcThreads(
                "task_queue_depth must be > 0".to_string(),
            ));
        }

        if self.max_heap_words == Some(0) {
            return Err(ConfigError::InvalidSegmentSize(
                "max_heap_words must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - MGC_MUTABLE_SEGMENT_WORDS
    /// - MGC_IMMUTABLE_SEGMENT_WORDS
    /// - MGC_MUTABLE_FREE_WORDS
    /// - MGC_IMMUTABLE_FREE_WORDS
    /// - MGC_MAX_HEAP_WORDS
    /// - MGC_GC_THREADS
    /// - MGC_NO_GROW
    /// - MGC_VERBOSE
    ///
    /// # Examples
    ///
    /// ```bash
    /// export MGC_MUTABLE_SEGMENT_WORDS=4194304
    /// export MGC_GC_THREADS=8
    /// export MGC_VERBOSE=1
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(words) = env_usize("MGC_MUTABLE_SEGMENT_WORDS") {
            config.mutable_segment_words = words;
        }

        if let Some(words) = env_usize("MGC_IMMUTABLE_SEGMENT_WORDS") {
            config.immutable_segment_words = words;
        }

        if let Some(words) = env_usize("MGC_MUTABLE_FREE_WORDS") {
            config.mutable_free_words = words;
        }

        if let Some(words) = env_usize("MGC_IMMUTABLE_FREE_WORDS") {
            config.immutable_free_words = words;
        }

        if let Some(words) = env_usize("MGC_MAX_HEAP_WORDS") {
            config.max_heap_words = Some(words);
        }

        if let Some(threads) = env_usize("MGC_GC_THREADS") {
            config.gc_threads = threads;
        }

        if let Ok(val) = std::env::var("MGC_NO_GROW") {
            config.allow_growth = !env_flag(&val);
        }

        if let Ok(val) = std::env::var("MGC_VERBOSE") {
            config.verbose = env_flag(&val);
        }

        config
    }

    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TuningConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Growth increment for a partition
    pub fn segment_words(&self, kind: SpaceKind) -> usize {
        match kind {
            SpaceKind::Mutable => self.mutable_segment_words,
            SpaceKind::Immutable => self.immutable_segment_words,
        }
    }

    /// Free space a partition must have after a cycle
    ///
    /// Full collections use the full targets, minor ones the minimum-free
    /// thresholds.
    pub fn required_free_words(&self, kind: SpaceKind, full: bool) -> usize {
        match (kind, full) {
            (SpaceKind::Mutable, true) => self.mutable_free_words,
            (SpaceKind::Mutable, false) => self.mutable_min_free_words,
            (SpaceKind::Immutable, true) => self.immutable_free_words,
            (SpaceKind::Immutable, false) => self.immutable_min_free_words,
        }
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid segment size: {0}")]
    InvalidSegmentSize(String),

    #[error("Invalid free-space target: {0}")]
    InvalidFreeTarget(String),

    #[error("Invalid growth setting: {0}")]
    InvalidGrowth(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid GC threads: {0}")]
    InvalidGcThreads(String),

    #[error("Could not parse configuration: {0}")]
    Parse(String),
}

// ============================================================================
// CONSTANTS & HELPERS
// ============================================================================

const KI_WORDS: usize = 1024;
const MI_WORDS: usize = 1024 * 1024;

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse::<usize>().ok()
}

fn env_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}
