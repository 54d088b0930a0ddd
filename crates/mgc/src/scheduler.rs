//! Full Collection Scheduler - Pulling a Deferred Full Collection Forward
//!
//! A full collection that was deferred normally waits for the next
//! collection request. When the heap is already close to the physical memory
//! of the machine, waiting only lets the mutable partition fill further and
//! makes the eventual full collection thrash harder, so the driver runs it
//! straight away.
//!
//! Load estimate:
//! ```text
//! used = Σ permanent sizes + Σ mutable capacities + Σ immutable (top - pointer)
//! load = used / (memory_words / 100)
//! ```
//! Mutable spaces count at full capacity because the mutator will fill them
//! before the next collection; immutable spaces only count what they hold.

use crate::heap::{MemoryManager, PhysicalMemory, SpaceKind, SystemMemory};
use crate::util::bytes_to_words;

/// FullCollectionScheduler - heap load check against physical memory
pub struct FullCollectionScheduler {
    threshold_percent: usize,
    memory: Box<dyn PhysicalMemory>,
}

impl FullCollectionScheduler {
    pub fn new(threshold_percent: usize, memory: Box<dyn PhysicalMemory>) -> Self {
        Self {
            threshold_percent,
            memory,
        }
    }

    /// Scheduler querying the operating system for physical memory
    pub fn with_system_memory(threshold_percent: usize) -> Self {
        Self::new(threshold_percent, Box::new(SystemMemory))
    }

    pub fn threshold_percent(&self) -> usize {
        self.threshold_percent
    }

    /// Resident heap load in words
    pub fn heap_load_words(&self, heap: &MemoryManager) -> usize {
        let permanent: usize = heap.permanent_spaces().iter().map(|space| space.size()).sum();
        let local: usize = heap
            .local_spaces()
            .iter()
            .map(|space| match space.kind() {
                SpaceKind::Mutable => space.size(),
                SpaceKind::Immutable => space.in_use_words(),
            })
            .sum();
        permanent + local
    }

    /// Resident heap load as a percentage of physical memory
    ///
    /// `None` when physical memory cannot be determined, including a reported
    /// size of zero or all ones. Machines with fewer than 100 words of memory
    /// count as fully loaded.
    pub fn heap_load_percent(&self, heap: &MemoryManager) -> Option<usize> {
        let bytes = self
            .memory
            .total_bytes()
            .filter(|&bytes| bytes != 0 && bytes != u64::MAX)?;
        let memory_words = usize::try_from(bytes_to_words(bytes)).unwrap_or(usize::MAX);
        if memory_words < 100 {
            return Some(100);
        }
        Some(self.heap_load_words(heap) / (memory_words / 100))
    }

    /// Should a deferred full collection run now?
    pub fn should_collect_now(&self, heap: &MemoryManager) -> bool {
        match self.heap_load_percent(heap) {
            Some(load) => {
                log::debug!(
                    "[MGC] heap load {}% of physical memory (threshold {}%)",
                    load,
                    self.threshold_percent
                );
                load > self.threshold_percent
            }
            None => {
                log::debug!("[MGC] physical memory size unknown, skipping heap load check");
                false
            }
        }
    }
}

impl std::fmt::Debug for FullCollectionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullCollectionScheduler")
            .field("threshold_percent", &self.threshold_percent)
            .field("memory_bytes", &self.memory.total_bytes())
            .finish()
    }
}
