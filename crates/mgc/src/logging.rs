//! GC Logging and Tracing
//!
//! Two layers:
//! - operational messages go through the `log` facade (`debug!` per phase,
//!   `info!` on heap growth, `warn!` on escalation, `error!` before aborting)
//! - typed `GcEvent`s go to a `GcLogger`, which keeps a bounded history and
//!   optionally prints them in human-readable or JSON form
//!
//! Log Levels:
//! - ERROR: allocation failure
//! - WARN: escalation, deferred full collections
//! - INFO: cycles, heap growth and shrinkage
//! - DEBUG: generation decisions, heap load

use crate::driver::CollectionKind;
use crate::heap::SpaceKind;
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Log level for GC events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

/// GC event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// `run_cycle` called
    CycleStart {
        cycle: u64,
        kind: CollectionKind,
        words_needed: usize,
    },

    /// `run_cycle` returned
    CycleEnd {
        cycle: u64,
        kind: CollectionKind,
        attempts: u32,
        duration_ms: f64,
        succeeded: bool,
    },

    /// A pending full collection replaced a minor one
    Escalated { cycle: u64 },

    /// A minor collection fell short; the next one will be full
    FullDeferred { cycle: u64 },

    /// The driver is starting another attempt
    Retry {
        cycle: u64,
        attempt: u32,
        reason: String,
    },

    /// Segment added
    HeapGrown { kind: SpaceKind, words: usize },

    /// Empty segments released
    HeapShrunk {
        kind: SpaceKind,
        words: usize,
        spaces: usize,
    },

    /// Survivors folded into the old generation
    GenerationMerged { cycle: u64 },

    /// Survivors stay young for another collection
    GenerationRecollected { cycle: u64, generation: u32 },

    /// Resident heap load measured for a deferred full collection
    HeapLoad { percent: usize, threshold: usize },

    /// A full collection could not make enough room
    AllocationFailure {
        words_needed: usize,
        mutable_free_words: usize,
        immutable_free_words: usize,
    },
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Print events to stdout
    pub console: bool,

    /// Append events to this file
    pub file: Option<PathBuf>,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Events kept in memory; older ones are dropped
    pub max_events: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            file: None,
            json: false,
            timestamps: true,
            max_events: 1024,
        }
    }
}

/// GC Logger - centralized record of GC events
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<VecDeque<(Instant, GcEvent)>>,
    file: Mutex<Option<File>>,
    enabled: AtomicBool,
}

impl GcLogger {
    /// Create new GC logger
    ///
    /// A log file that cannot be opened is reported through `log::warn!` and
    /// file output is skipped.
    pub fn new(config: GcLoggerConfig) -> Self {
        let file = config.file.as_ref().and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| log::warn!("[MGC] cannot open GC log {}: {}", path.display(), e))
                .ok()
        });

        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            file: Mutex::new(file),
            enabled: AtomicBool::new(true),
        }
    }

    /// Logger printing human-readable events to stdout
    pub fn verbose() -> Self {
        Self::new(GcLoggerConfig {
            console: true,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &GcLoggerConfig {
        &self.config
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() || event_level(&event) > self.config.level {
            return;
        }

        if self.config.console || self.config.file.is_some() {
            let line = self.format(&event);
            if self.config.console {
                println!("{}", line);
            }
            if let Some(file) = self.file.lock().as_mut() {
                if let Err(e) = writeln!(file, "{}", line) {
                    log::warn!("[MGC] GC log write failed: {}", e);
                }
            }
        }

        let mut events = self.events.lock();
        if events.len() >= self.config.max_events {
            events.pop_front();
        }
        if self.config.max_events > 0 {
            events.push_back((Instant::now(), event));
        }
    }

    fn format(&self, event: &GcEvent) -> String {
        let body = if self.config.json {
            serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
        } else {
            format_human(event)
        };

        if self.config.timestamps {
            let now = chrono::Local::now();
            format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), body)
        } else {
            body
        }
    }

    /// Get all retained events
    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

fn event_level(event: &GcEvent) -> LogLevel {
    match event {
        GcEvent::AllocationFailure { .. } => LogLevel::Error,
        GcEvent::Escalated { .. } | GcEvent::FullDeferred { .. } => LogLevel::Warn,
        GcEvent::CycleStart { .. }
        | GcEvent::CycleEnd { .. }
        | GcEvent::Retry { .. }
        | GcEvent::HeapGrown { .. }
        | GcEvent::HeapShrunk { .. } => LogLevel::Info,
        GcEvent::GenerationMerged { .. }
        | GcEvent::GenerationRecollected { .. }
        | GcEvent::HeapLoad { .. } => LogLevel::Debug,
    }
}

fn format_human(event: &GcEvent) -> String {
    match event {
        GcEvent::CycleStart {
            cycle,
            kind,
            words_needed,
        } => format!("[GC] Cycle {} started ({}, {} words needed)", cycle, kind, words_needed),
        GcEvent::CycleEnd {
            cycle,
            kind,
            attempts,
            duration_ms,
            succeeded,
        } => format!(
            "[GC] Cycle {} {} ({}, {} attempts, {:.2}ms)",
            cycle,
            if *succeeded { "completed" } else { "failed" },
            kind,
            attempts,
            duration_ms
        ),
        GcEvent::Escalated { cycle } => {
            format!("[GC] Cycle {}: escalated to a full collection", cycle)
        }
        GcEvent::FullDeferred { cycle } => {
            format!("[GC] Cycle {}: next collection will be full", cycle)
        }
        GcEvent::Retry {
            cycle,
            attempt,
            reason,
        } => format!("[GC] Cycle {}: attempt {} ({})", cycle, attempt, reason),
        GcEvent::HeapGrown { kind, words } => {
            format!("[GC] Heap: {} partition grown by {} words", kind, words)
        }
        GcEvent::HeapShrunk {
            kind,
            words,
            spaces,
        } => format!(
            "[GC] Heap: {} partition shrunk by {} words ({} spaces)",
            kind, words, spaces
        ),
        GcEvent::GenerationMerged { cycle } => {
            format!("[GC] Cycle {}: generation merged", cycle)
        }
        GcEvent::GenerationRecollected { cycle, generation } => format!(
            "[GC] Cycle {}: generation kept young (recollection {})",
            cycle, generation
        ),
        GcEvent::HeapLoad { percent, threshold } => {
            format!("[GC] Heap load {}% (threshold {}%)", percent, threshold)
        }
        GcEvent::AllocationFailure {
            words_needed,
            mutable_free_words,
            immutable_free_words,
        } => format!(
            "[GC] Allocation failure: {} words (free: {} mutable, {} immutable)",
            words_needed, mutable_free_words, immutable_free_words
        ),
    }
}

lazy_static! {
    static ref GLOBAL_LOGGER: RwLock<Arc<GcLogger>> = RwLock::new(Arc::new(GcLogger::default()));
}

/// Shared handle to the global logger
pub fn global_logger() -> Arc<GcLogger> {
    Arc::clone(&GLOBAL_LOGGER.read())
}

/// Log a GC event to global logger
pub fn log_event(event: GcEvent) {
    GLOBAL_LOGGER.read().log(event);
}

/// Replace the global logger
///
/// Handles obtained earlier from `global_logger` keep the old logger.
pub fn configure_logger(config: GcLoggerConfig) {
    *GLOBAL_LOGGER.write() = Arc::new(GcLogger::new(config));
}

/// Get global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.read().event_count()
}
