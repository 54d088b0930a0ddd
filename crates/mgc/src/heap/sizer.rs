//! Heap Sizer - Growing and Shrinking the Partitions
//!
//! The sizer runs at fixed points of a collection cycle:
//! - after marking in a full cycle, to make room for the survivors of the
//!   immutable partition before the copy phase needs it
//! - after a full cycle, to restore the free-space targets or hand empty
//!   segments back
//! - after every cycle, to check whether a partition is "really full"
//!
//! Growth is best-effort. A refused request is halved until it drops to the
//! growth floor; if nothing can be added the cycle carries on with what the
//! heap already has.
//!
//! Anti-fragmentation: every growth request gets one extra segment increment
//! per `segments_per_extra_increment` spaces already in the partition, so a
//! heap that keeps growing does so in ever larger steps.

use super::{LocalSpace, MemoryManager, SpaceKind};
use crate::config::TuningConfig;
use crate::error::Result;
use crate::util::Alignment;
use std::sync::Arc;

/// What one sizing call did to a partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeChange {
    /// Words added by a new segment
    pub grown_words: usize,
    /// Words returned to the segment source
    pub released_words: usize,
    /// Number of spaces deleted
    pub released_spaces: usize,
}

impl SizeChange {
    pub fn is_unchanged(&self) -> bool {
        self.grown_words == 0 && self.released_words == 0
    }

    pub(crate) fn merge(&mut self, other: SizeChange) {
        self.grown_words += other.grown_words;
        self.released_words += other.released_words;
        self.released_spaces += other.released_spaces;
    }
}

/// HeapSizer - growth and shrink policy for both partitions
#[derive(Debug, Clone)]
pub struct HeapSizer {
    config: Arc<TuningConfig>,
}

impl HeapSizer {
    pub fn new(config: Arc<TuningConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Add one segment of `words` words to a partition
    ///
    /// A refused request is retried at half the size while the halved size
    /// stays above the growth floor. Returns false if nothing was added.
    pub fn try_grow(&self, heap: &mut MemoryManager, words: usize, kind: SpaceKind) -> bool {
        self.grow(heap, words, kind).is_some()
    }

    /// Make room for `words_needed` words of marked immutable data
    ///
    /// Called after the mark phase of a full cycle. The partition is grown so
    /// its capacity covers the marked data plus the immutable free target.
    pub fn expand_immutable_for(&self, heap: &mut MemoryManager, words_needed: usize) -> SizeChange {
        let (current, spaces) = heap
            .spaces_of(SpaceKind::Immutable)
            .fold((0usize, 0usize), |(size, n), space| (size + space.size(), n + 1));

        let wanted = self.config.immutable_free_words.saturating_add(words_needed);
        if wanted <= current {
            return SizeChange::default();
        }

        let words = self.growth_request(SpaceKind::Immutable, wanted - current, spaces, 0);
        log::debug!(
            "[MGC] immutable partition of {} words is short for {} marked words, requesting {}",
            current,
            words_needed,
            words
        );

        SizeChange {
            grown_words: self.grow(heap, words, SpaceKind::Immutable).unwrap_or(0),
            ..SizeChange::default()
        }
    }

    /// Check whether a partition falls short of its free-space requirement
    ///
    /// For the mutable partition `words_needed` is a pending allocation: it
    /// must fit contiguously in one space, and is taken out of that space's
    /// free area before the remainder counts toward the reserve. For the
    /// immutable partition it is overflow that need not be contiguous, so it
    /// simply adds to the reserve.
    ///
    /// `full` selects the full-collection targets rather than the minor
    /// minimum-free thresholds. A mutable partition with no space at all is
    /// always full, whatever the targets.
    pub fn is_really_full(
        &self,
        heap: &MemoryManager,
        kind: SpaceKind,
        words_needed: usize,
        full: bool,
    ) -> bool {
        let mut required = self.config.required_free_words(kind, full);
        let mut placed = !kind.is_mutable();
        if placed {
            required = required.saturating_add(words_needed);
        }

        for space in heap.spaces_of(kind) {
            let mut free = space.free_words();
            if !placed && free >= words_needed {
                free -= words_needed;
                placed = true;
            }
            required = required.saturating_sub(free);
        }

        !placed || required != 0
    }

    /// Restore a partition's free-space target after a full cycle
    ///
    /// Grows the partition when free space is below `words_required` plus the
    /// target, or, for the mutable partition, when no single space can hold
    /// `words_required` (an empty mutable partition always grows). Otherwise, unless shrinking is disabled, deletes
    /// empty spaces (most recently created first) while each fits within the
    /// surplus.
    pub fn adjust_size(
        &self,
        heap: &mut MemoryManager,
        kind: SpaceKind,
        words_required: usize,
    ) -> Result<SizeChange> {
        let mut free = 0usize;
        let mut largest_free = 0usize;
        let mut spaces = 0usize;
        for space in heap.spaces_of(kind) {
            free += space.free_words();
            largest_free = largest_free.max(space.free_words());
            spaces += 1;
        }

        let required = words_required.saturating_add(self.config.required_free_words(kind, true));

        let unplaceable = kind.is_mutable() && (spaces == 0 || largest_free < words_required);
        if required > free || unplaceable {
            let words = self.growth_request(
                kind,
                required.saturating_sub(free),
                spaces,
                words_required,
            );
            log::debug!(
                "[MGC] {} partition has {} of {} free words (largest {}), requesting {}",
                kind,
                free,
                required,
                largest_free,
                words
            );
            return Ok(SizeChange {
                grown_words: self.grow(heap, words, kind).unwrap_or(0),
                ..SizeChange::default()
            });
        }

        if !self.config.allow_shrink {
            return Ok(SizeChange::default());
        }

        let mut surplus = free - required;
        let mut change = SizeChange::default();
        for index in (0..heap.local_spaces().len()).rev() {
            let space = &heap.local_spaces()[index];
            if space.kind() == kind && space.is_empty() && space.size() <= surplus {
                let (id, size) = (space.id(), space.size());
                heap.delete_segment(index)?;
                surplus -= size;
                change.released_words += size;
                change.released_spaces += 1;
                log::debug!("[MGC] released empty {} space {} ({} words)", kind, id, size);
            }
        }

        if change.released_spaces > 0 {
            log::info!(
                "[MGC] {} partition shrunk by {} words in {} spaces",
                kind,
                change.released_words,
                change.released_spaces
            );
        }
        Ok(change)
    }

    /// Size of a growth request covering `deficit` words
    ///
    /// At least one segment increment, plus the anti-fragmentation
    /// increments, never below `minimum`, rounded up to the growth
    /// granularity.
    fn growth_request(&self, kind: SpaceKind, deficit: usize, spaces: usize, minimum: usize) -> usize {
        let increment = self.config.segment_words(kind);
        let extra = spaces / self.config.segments_per_extra_increment;
        let growth = deficit
            .max(increment)
            .saturating_add(increment.saturating_mul(extra))
            .max(minimum);
        Alignment::round_up(growth, self.config.growth_granularity_words)
    }

    /// Returns the words actually added
    fn grow(&self, heap: &mut MemoryManager, mut words: usize, kind: SpaceKind) -> Option<usize> {
        if !self.config.allow_growth {
            log::debug!("[MGC] heap growth disabled, {} words not added", words);
            return None;
        }

        loop {
            if heap.try_allocate_segment(words, kind) {
                let added = heap.local_spaces().last().map_or(words, LocalSpace::size);
                log::info!("[MGC] {} partition grown by {} words", kind, added);
                return Some(added);
            }
            words /= 2;
            if words <= self.config.growth_floor_words {
                log::warn!("[MGC] could not grow the {} partition", kind);
                return None;
            }
            log::debug!("[MGC] segment refused, retrying with {} words", words);
        }
    }
}
