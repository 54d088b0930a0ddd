//! Heap Spaces - Collected and Permanent Segments
//!
//! A local space is a contiguous run of words `[bottom, top)`. Allocation
//! proceeds top-down from `pointer`, so `[pointer, top)` holds objects and
//! `[bottom, pointer)` is free.
//!
//! Space Layout:
//! ```text
//! bottom        pointer           gen_top              top
//!   │   free       │  current gen    │   older data      │
//!   └──────────────┴─────────────────┴───────────────────┘
//! ```
//!
//! Between cycles `bottom ≤ pointer ≤ gen_top ≤ top` holds for every space.
//! A minor cycle only traces `[gen_bottom, gen_top)`; a full cycle first
//! raises `gen_top` to `top` so the whole space counts as the current
//! generation.

use super::bitmap::Bitmap;
use super::SpaceKind;
use crate::error::{GcError, Result};
use crate::ensure_invariant;

/// Per-cycle counters filled in by the phase collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceCounters {
    /// Words of immutable objects marked in this space
    pub immutable_marked: usize,
    /// Words of mutable objects marked in this space
    pub mutable_marked: usize,
    /// Words copied into this space by the copy phase
    pub copied: usize,
    /// Words of live objects in this space visited by the update phase
    pub updated: usize,
}

impl SpaceCounters {
    /// Zero every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Address range a weak-reference scan must cover
///
/// The range is inclusive. The empty range is encoded as
/// `highest < lowest`, which is how a cycle starts: `highest = bottom`,
/// `lowest = top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakBounds {
    pub lowest: usize,
    pub highest: usize,
}

impl WeakBounds {
    /// Empty range for a segment `[bottom, top)`
    pub fn empty(bottom: usize, top: usize) -> Self {
        Self {
            lowest: top,
            highest: bottom,
        }
    }

    /// True when no weak reference has been recorded
    pub fn is_empty(&self) -> bool {
        self.highest < self.lowest
    }

    /// Widen the range to include `address`
    pub fn include(&mut self, address: usize) {
        self.lowest = self.lowest.min(address);
        self.highest = self.highest.max(address);
    }
}

/// LocalSpace - a collected heap segment
#[derive(Debug)]
pub struct LocalSpace {
    /// Identifier assigned by the memory manager, unique per process
    id: u64,
    kind: SpaceKind,
    bottom: usize,
    top: usize,
    /// Allocation frontier
    pointer: usize,
    /// Boundary between the current generation and older data
    gen_top: usize,
    /// Value of `pointer` when the current cycle started
    gen_bottom: usize,
    /// Mark bits over `[bottom, top)`
    bitmap: Bitmap,
    /// Counters for the cycle in progress
    pub counters: SpaceCounters,
    /// Weak-reference scan range
    pub weak: WeakBounds,
}

impl LocalSpace {
    /// Create an empty space covering `[bottom, bottom + words)`
    pub fn new(id: u64, kind: SpaceKind, bottom: usize, words: usize) -> Self {
        let top = bottom + words;
        Self {
            id,
            kind,
            bottom,
            top,
            pointer: top,
            gen_top: top,
            gen_bottom: top,
            bitmap: Bitmap::new(words),
            counters: SpaceCounters::default(),
            weak: WeakBounds::empty(bottom, top),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn is_mutable(&self) -> bool {
        self.kind == SpaceKind::Mutable
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn gen_top(&self) -> usize {
        self.gen_top
    }

    pub fn gen_bottom(&self) -> usize {
        self.gen_bottom
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Total capacity in words
    pub fn size(&self) -> usize {
        self.top - self.bottom
    }

    /// Words below the allocation pointer
    pub fn free_words(&self) -> usize {
        self.pointer.saturating_sub(self.bottom)
    }

    /// Words at or above the allocation pointer
    pub fn in_use_words(&self) -> usize {
        self.top.saturating_sub(self.pointer)
    }

    /// Words between the allocation pointer and the generation boundary
    pub fn generation_words(&self) -> usize {
        self.gen_top.saturating_sub(self.pointer)
    }

    /// Nothing is allocated in the space
    pub fn is_empty(&self) -> bool {
        self.pointer == self.top
    }

    /// Bump-allocate `words` from the frontier, returning the new object's address
    pub fn allocate(&mut self, words: usize) -> Option<usize> {
        if self.free_words() < words {
            return None;
        }
        self.pointer -= words;
        Some(self.pointer)
    }

    /// Move the allocation frontier
    ///
    /// Used by the copy phase to publish the compacted frontier. The bounds
    /// invariant is checked by the driver, not here.
    pub fn set_pointer(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    /// Check `bottom ≤ pointer ≤ gen_top ≤ top`
    pub fn check_bounds(&self) -> Result<()> {
        ensure_invariant!(
            self.bottom <= self.pointer && self.pointer <= self.gen_top && self.gen_top <= self.top,
            "space {} bounds out of order: bottom={:#x} pointer={:#x} gen_top={:#x} top={:#x}",
            self.id,
            self.bottom,
            self.pointer,
            self.gen_top,
            self.top
        );
        Ok(())
    }

    /// Check that no mark bit is set at or beyond `gen_top - bottom`
    pub fn check_bitmap_clean_above_generation(&self) -> Result<()> {
        let limit = self.gen_top - self.bottom;
        match self.bitmap.first_set_from(limit) {
            Some(bit) => Err(GcError::InvariantViolation(format!(
                "space {} has mark bit {} set beyond generation limit {}",
                self.id, bit, limit
            ))),
            None => Ok(()),
        }
    }

    /// Snapshot the frontier and reset per-cycle state
    pub(crate) fn begin_cycle(&mut self) {
        self.gen_bottom = self.pointer;
        self.counters.reset();
        self.weak = WeakBounds::empty(self.bottom, self.top);
    }

    /// Treat the whole space as the current generation
    pub(crate) fn include_all_in_generation(&mut self) {
        self.gen_top = self.top;
    }

    /// Fold the current generation into the old data
    pub(crate) fn merge_generation(&mut self) {
        self.gen_top = self.pointer;
    }

    /// Clear the mark bits of the current generation
    pub(crate) fn clear_generation_marks(&self) {
        self.bitmap.clear_bits(0, self.gen_top - self.bottom);
    }
}

/// PermanentSpace - a fixed segment that is never collected
///
/// It is traced as a root and may contain weak references.
#[derive(Debug, Clone)]
pub struct PermanentSpace {
    bottom: usize,
    top: usize,
    pub weak: WeakBounds,
}

impl PermanentSpace {
    pub fn new(bottom: usize, top: usize) -> Self {
        Self {
            bottom,
            top,
            weak: WeakBounds::empty(bottom, top),
        }
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn size(&self) -> usize {
        self.top - self.bottom
    }

    pub(crate) fn begin_cycle(&mut self) {
        self.weak = WeakBounds::empty(self.bottom, self.top);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_space_is_empty() {
        let space = LocalSpace::new(1, SpaceKind::Mutable, 0x1000, 4096);
        assert!(space.is_empty());
        assert_eq!(space.free_words(), 4096);
        assert_eq!(space.pointer(), space.top());
        assert_eq!(space.gen_top(), space.top());
        assert!(space.check_bounds().is_ok());
    }

    #[test]
    fn test_allocate_top_down() {
        let mut space = LocalSpace::new(1, SpaceKind::Mutable, 0, 100);
        assert_eq!(space.allocate(10), Some(90));
        assert_eq!(space.allocate(90), Some(0));
        assert_eq!(space.allocate(1), None);
        assert_eq!(space.free_words(), 0);
        assert_eq!(space.in_use_words(), 100);
    }

    #[test]
    fn test_begin_cycle_resets_state() {
        let mut space = LocalSpace::new(1, SpaceKind::Immutable, 0, 100);
        space.allocate(30);
        space.counters.updated = 7;
        space.weak.include(80);

        space.begin_cycle();

        assert_eq!(space.gen_bottom(), 70);
        assert_eq!(space.counters, SpaceCounters::default());
        assert!(space.weak.is_empty());
        assert_eq!(space.weak, WeakBounds::empty(0, 100));
    }

    #[test]
    fn test_bounds_violation_detected() {
        let mut space = LocalSpace::new(3, SpaceKind::Mutable, 100, 100);
        space.set_pointer(50);
        assert!(space.check_bounds().is_err());
    }

    #[test]
    fn test_merge_generation() {
        let mut space = LocalSpace::new(1, SpaceKind::Mutable, 0, 100);
        space.allocate(40);
        assert_eq!(space.generation_words(), 40);
        space.merge_generation();
        assert_eq!(space.gen_top(), 60);
        assert_eq!(space.generation_words(), 0);
    }

    #[test]
    fn test_clear_generation_marks() {
        let mut space = LocalSpace::new(1, SpaceKind::Mutable, 0, 256);
        space.allocate(100);
        space.merge_generation();
        space.bitmap().set_range(150, 10);
        assert!(space.check_bitmap_clean_above_generation().is_err());

        space.include_all_in_generation();
        space.clear_generation_marks();
        assert_eq!(space.bitmap().count_set(), 0);
        assert!(space.check_bitmap_clean_above_generation().is_ok());
    }

    #[test]
    fn test_weak_bounds_include() {
        let mut weak = WeakBounds::empty(0, 100);
        weak.include(40);
        weak.include(10);
        assert!(!weak.is_empty());
        assert_eq!(weak.lowest, 10);
        assert_eq!(weak.highest, 40);
    }
}
