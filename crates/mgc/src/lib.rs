//! # MGC - Generational Mark-Compact Collection Driver
//!
//! MGC is the collection-cycle driver and adaptive heap-sizing policy of a
//! generational, multi-threaded, stop-the-world mark-compact garbage
//! collector. It decides whether a collection is minor or full, runs the
//! mark / copy / update phases in order, grows and shrinks heap segments
//! around them, and decides whether survivors join the old generation.
//!
//! The object-level algorithms (tracing, relocation, pointer fix-up, weak
//! reference detection) depend on the runtime's object layout and are
//! plugged in through [`CollectionPhases`].
//!
//! ## Overview
//!
//! - **Two partitions**: mutable and immutable objects live in separate
//!   local spaces; immutable data that cannot be moved out of a mutable
//!   space during a cycle is reported as overflow
//! - **Generations by boundary**: each space's `gen_top` separates the
//!   current generation from older data; a minor cycle only traces the
//!   current generation
//! - **Escalation**: a minor cycle that leaves the heap short makes the next
//!   attempt full; a full cycle that is still short fails
//! - **Adaptive sizing**: immutable space is pre-expanded after marking;
//!   after a full cycle both partitions are grown toward their free-space
//!   targets or shrunk by releasing empty segments
//! - **Load check**: a pending full collection runs immediately when the
//!   heap approaches physical memory
//!
//! ## Quick Start
//!
//! ```rust
//! use mgc::{
//!     AbortOnFatal, CollectionKind, CollectionPhases, GarbageCollector, MemoryManager,
//!     ReservedSegmentSource, TaskFarm, TuningConfig,
//! };
//! use std::sync::Arc;
//!
//! /// Phases for a heap with no live objects
//! struct NoLiveObjects;
//!
//! impl CollectionPhases for NoLiveObjects {
//!     fn mark(&mut self, _heap: &mut MemoryManager, _farm: &TaskFarm) {}
//!     fn copy(&mut self, _heap: &mut MemoryManager, _farm: &TaskFarm) -> usize {
//!         0
//!     }
//!     fn update(&mut self, _heap: &mut MemoryManager, _farm: &TaskFarm) {}
//! }
//!
//! fn main() -> Result<(), mgc::GcError> {
//!     let config = TuningConfig {
//!         mutable_segment_words: 4096,
//!         immutable_segment_words: 4096,
//!         mutable_free_words: 4096,
//!         immutable_free_words: 4096,
//!         mutable_min_free_words: 1024,
//!         immutable_min_free_words: 1024,
//!         ..Default::default()
//!     };
//!     let farm = mgc::runtime::initialise(&config, &AbortOnFatal);
//!     let heap = MemoryManager::new(Box::new(ReservedSegmentSource::new(0x10_0000, 1 << 20)));
//!
//!     let gc = GarbageCollector::new(config, heap, NoLiveObjects, farm, Arc::new(AbortOnFatal))?;
//!
//!     // The first collection sizes the empty heap
//!     gc.collect(CollectionKind::Minor, 100)?;
//!     let address = gc.allocate(100)?;
//!     assert!(address >= 0x10_0000);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   GarbageCollector                        │
//! │   collect(kind, words) ──► CollectionDriver::run_cycle    │
//! └──────────────────────────────┬───────────────────────────┘
//!                                │
//!        ┌───────────────┬───────┴───────┬──────────────────┐
//!        ▼               ▼               ▼                  ▼
//!   HeapSizer    GenerationalPolicy  FullCollection   CollectionPhases
//!   grow/shrink   merge or keep       Scheduler        mark/copy/update
//!        │          young             heap load             │
//!        ▼                                                  ▼
//!   MemoryManager ◄──── SegmentSource                   TaskFarm
//!   local + permanent   (mmap / reserved)               (rayon pool)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Tuning parameters and validation
//! - [`driver`]: The collection cycle and its retry loop
//! - [`error`]: Error types for all MGC operations
//! - [`gc`]: Collector facade
//! - [`heap`]: Spaces, bitmaps, segment sources, heap sizing
//! - [`logging`]: GC event logging
//! - [`phases`]: Collaborator traits and fatal-error handling
//! - [`policy`]: Generational merge policy
//! - [`runtime`]: Process-wide initialisation
//! - [`scheduler`]: Heap load check for deferred full collections
//! - [`stats`]: Cycle statistics
//! - [`task_farm`]: Worker pool for the parallel phases
//! - [`util`]: Utility functions and helpers
//!
//! ## Limitations
//!
//! - **Stop-the-world only**: no incremental or concurrent collection
//! - **No allocation fast path**: compiled-code allocation is the runtime's job
//! - **Layout-agnostic**: object tags and headers are not interpreted here

// Core collection modules
pub mod config;
pub mod driver;
pub mod error;
pub mod gc;

// Heap management
pub mod heap;
pub mod policy;
pub mod scheduler;

// Collaborators and infrastructure
pub mod phases;
pub mod runtime;
pub mod task_farm;

// Monitoring
pub mod logging;
pub mod stats;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use config::{ConfigError, TuningConfig};
pub use driver::{CollectionDriver, CollectionKind, CollectorState};
pub use error::{GcError, Result};
pub use gc::GarbageCollector;
pub use heap::sizer::SizeChange;
pub use heap::{
    Bitmap, FixedMemory, HeapSizer, LocalSpace, MemoryManager, MmapSegmentSource,
    PermanentSpace, PhysicalMemory, ReservedSegmentSource, Segment, SegmentSource,
    SpaceCounters, SpaceKind, SystemMemory, WeakBounds,
};
pub use logging::{GcEvent, GcLogger, GcLoggerConfig, LogLevel};
pub use phases::{AbortOnFatal, CollectionPhases, FatalHandler, PanicOnFatal};
pub use policy::GenerationalPolicy;
pub use scheduler::FullCollectionScheduler;
pub use stats::{CycleReport, GcStats, GcSummary};
pub use task_farm::{PhaseScope, TaskFarm};

/// MGC version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = TuningConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
