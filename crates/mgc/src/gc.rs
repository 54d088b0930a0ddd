//! GC Facade - Collector Entry Point for the Runtime
//!
//! `GarbageCollector` owns the heap, the driver and the phase
//! implementations, and serialises collections: only one `run_cycle` can be
//! in progress at a time. The runtime is expected to have stopped its
//! mutator threads before calling `collect`.

use crate::config::TuningConfig;
use crate::driver::{CollectionDriver, CollectionKind, CollectorState};
use crate::error::{GcError, Result};
use crate::heap::{MemoryManager, SpaceKind};
use crate::phases::{CollectionPhases, FatalHandler};
use crate::stats::GcStats;
use crate::task_farm::TaskFarm;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct CycleParts<P> {
    driver: CollectionDriver,
    phases: P,
}

/// GarbageCollector - main GC interface
pub struct GarbageCollector<P: CollectionPhases> {
    config: Arc<TuningConfig>,
    /// Lock order: `cycle` before `heap`
    cycle: Mutex<CycleParts<P>>,
    heap: Mutex<MemoryManager>,
    collecting: AtomicBool,
}

impl<P: CollectionPhases> GarbageCollector<P> {
    /// Create a collector over `heap`
    pub fn new(
        config: TuningConfig,
        heap: MemoryManager,
        phases: P,
        farm: Arc<TaskFarm>,
        fatal: Arc<dyn FatalHandler>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let driver = CollectionDriver::new(Arc::clone(&config), farm, fatal);
        Ok(Self::from_driver(driver, heap, phases))
    }

    /// Create a collector around an already configured driver
    pub fn from_driver(driver: CollectionDriver, heap: MemoryManager, phases: P) -> Self {
        let config = Arc::new(driver.config().clone());
        Self {
            config,
            cycle: Mutex::new(CycleParts { driver, phases }),
            heap: Mutex::new(heap),
            collecting: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Run one collection
    ///
    /// Fails with `OutOfMemory` if `words_needed` could not be made available
    /// in a mutable space.
    pub fn collect(&self, kind: CollectionKind, words_needed: usize) -> Result<()> {
        let mut parts = self.cycle.lock();
        let mut heap = self.heap.lock();
        let CycleParts { driver, phases } = &mut *parts;

        self.collecting.store(true, Ordering::Release);
        let succeeded = driver.run_cycle(&mut *heap, phases, kind.is_full(), words_needed);
        self.collecting.store(false, Ordering::Release);

        if succeeded {
            Ok(())
        } else {
            Err(GcError::OutOfMemory {
                requested_words: words_needed,
            })
        }
    }

    /// Allocate `words` words in a mutable space, collecting if none has room
    ///
    /// Returns the word address of the new object.
    pub fn allocate(&self, words: usize) -> Result<usize> {
        if let Some(address) = allocate_mutable(&mut self.heap.lock(), words) {
            return Ok(address);
        }

        if self.config.verbose {
            log::info!("[MGC] no mutable space holds {} words, collecting", words);
        }
        self.collect(CollectionKind::Minor, words)?;

        allocate_mutable(&mut self.heap.lock(), words).ok_or(GcError::OutOfMemory {
            requested_words: words,
        })
    }

    /// Run `f` with exclusive access to the heap
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut MemoryManager) -> R) -> R {
        f(&mut self.heap.lock())
    }

    /// Run `f` with exclusive access to the phase implementations
    pub fn with_phases<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.cycle.lock().phases)
    }

    /// Check if a collection is currently running
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CollectorState {
        self.cycle.lock().driver.state()
    }

    pub fn stats(&self) -> Arc<GcStats> {
        self.cycle.lock().driver.stats()
    }

    /// Number of `collect` calls made so far
    pub fn cycle_count(&self) -> u64 {
        self.stats().cycle_count()
    }

    /// Get detailed diagnostic information
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut diagnostics = IndexMap::new();
        let parts = self.cycle.lock();
        let state = parts.driver.state();
        let summary = parts.driver.stats().summary();

        diagnostics.insert("cycle_count".to_string(), summary.cycles.to_string());
        diagnostics.insert(
            "this_generation".to_string(),
            state.this_generation.to_string(),
        );
        diagnostics.insert(
            "defer_full_next_time".to_string(),
            state.defer_full_next_time.to_string(),
        );

        {
            let heap = self.heap.lock();
            for kind in [SpaceKind::Mutable, SpaceKind::Immutable] {
                diagnostics.insert(
                    format!("{}_spaces", kind),
                    heap.spaces_of(kind).count().to_string(),
                );
                diagnostics.insert(
                    format!("{}_capacity_words", kind),
                    heap.capacity_words(kind).to_string(),
                );
                diagnostics.insert(
                    format!("{}_free_words", kind),
                    heap.free_words(kind).to_string(),
                );
            }
            diagnostics.insert(
                "permanent_spaces".to_string(),
                heap.permanent_spaces().len().to_string(),
            );
            if let Some(load) = parts.driver.scheduler().heap_load_percent(&heap) {
                diagnostics.insert("heap_load_percent".to_string(), load.to_string());
            }
        }

        diagnostics.insert("escalations".to_string(), summary.escalations.to_string());
        diagnostics.insert("failures".to_string(), summary.failures.to_string());
        diagnostics.insert("words_grown".to_string(), summary.words_grown.to_string());
        diagnostics.insert(
            "words_released".to_string(),
            summary.words_released.to_string(),
        );
        diagnostics.insert(
            "avg_pause_ms".to_string(),
            format!("{:.3}", summary.avg_pause_ms),
        );

        diagnostics
    }
}

fn allocate_mutable(heap: &mut MemoryManager, words: usize) -> Option<usize> {
    heap.local_spaces_mut()
        .iter_mut()
        .filter(|space| space.is_mutable())
        .find(|space| space.free_words() >= words)
        .and_then(|space| space.allocate(words))
}
