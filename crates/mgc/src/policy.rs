//! Generational Policy - Merge or Re-collect Survivors
//!
//! After a cycle the survivors of the current generation either join the old
//! data (`gen_top` drops to `pointer`) or stay "young" so the next minor
//! cycle traces them again.
//!
//! The deciding signal is how much of the generation the update phase
//! actually visited. If fewer than half of its words were updated, the
//! compaction left significant gaps and treating the survivors as old would
//! freeze those gaps in place. In particular, a large object that could not
//! be moved this time may find room next time, because space vacated by a
//! moved object only becomes usable once the update phase is done with its
//! tombstone.

use crate::heap::{LocalSpace, MemoryManager};

/// GenerationalPolicy - decides merge vs. re-collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationalPolicy {
    /// Consecutive re-collections allowed before the generation is merged
    cap: u32,
}

impl GenerationalPolicy {
    pub fn new(cap: u32) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Should the current generation be collected again next time?
    ///
    /// Never true once `generation_count` exceeds the cap, or when the
    /// generation is empty.
    pub fn should_recollect(&self, heap: &MemoryManager, generation_count: u32) -> bool {
        if generation_count > self.cap {
            return false;
        }

        let total: usize = heap
            .local_spaces()
            .iter()
            .map(LocalSpace::generation_words)
            .sum();
        if total == 0 {
            return false;
        }

        let updated: usize = heap
            .local_spaces()
            .iter()
            .map(|space| space.counters.updated)
            .sum();

        updated.saturating_mul(2) < total
    }
}

impl Default for GenerationalPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
