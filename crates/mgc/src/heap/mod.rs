//! Heap Module - Spaces and Segment Management
//!
//! The heap is a set of local (collected) spaces plus a set of permanent
//! spaces. Local spaces are split into two partitions by `SpaceKind`:
//! mutable objects and immutable objects are never mixed in one space.
//!
//! The `MemoryManager` owns both collections in creation order. New spaces
//! are appended, so the most recently created space is always last, which is
//! the order the heap sizer releases empty spaces in.

pub mod bitmap;
pub mod physical;
pub mod segment;
pub mod sizer;
pub mod space;

pub use bitmap::Bitmap;
pub use physical::{FixedMemory, PhysicalMemory, SystemMemory};
pub use segment::{MmapSegmentSource, ReservedSegmentSource, Segment, SegmentSource};
pub use sizer::HeapSizer;
pub use space::{LocalSpace, PermanentSpace, SpaceCounters, WeakBounds};

use crate::config::TuningConfig;
use crate::error::{GcError, Result};
use serde::Serialize;
use std::fmt;

/// Partition a local space belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpaceKind {
    Mutable,
    Immutable,
}

impl SpaceKind {
    pub fn is_mutable(self) -> bool {
        self == SpaceKind::Mutable
    }
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceKind::Mutable => write!(f, "mutable"),
            SpaceKind::Immutable => write!(f, "immutable"),
        }
    }
}

/// MemoryManager - owner of every heap space
///
/// Segment allocation is best-effort: `try_allocate_segment` reports failure
/// instead of erroring, and the caller decides whether to retry smaller.
pub struct MemoryManager {
    local: Vec<LocalSpace>,
    permanent: Vec<PermanentSpace>,
    source: Box<dyn SegmentSource>,
    next_id: u64,
}

impl MemoryManager {
    /// Create an empty heap backed by `source`
    pub fn new(source: Box<dyn SegmentSource>) -> Self {
        Self {
            local: Vec::new(),
            permanent: Vec::new(),
            source,
            next_id: 1,
        }
    }

    /// Create an empty heap backed by anonymous mappings, capped by
    /// `config.max_heap_words`
    pub fn with_config(config: &TuningConfig) -> Self {
        Self::new(Box::new(MmapSegmentSource::new(config.max_heap_words)))
    }

    /// Add a local space of at least `words` words
    ///
    /// Returns false if the segment source refused the request.
    pub fn try_allocate_segment(&mut self, words: usize, kind: SpaceKind) -> bool {
        match self.source.reserve(words, kind) {
            Some(segment) if segment.bottom.checked_add(segment.words).is_none() => {
                log::warn!(
                    "[MGC] {} segment at {:#x} of {} words wraps the address space",
                    kind,
                    segment.bottom,
                    segment.words
                );
                let _ = self.source.release(segment, kind);
                false
            }
            Some(segment) => {
                let id = self.next_id;
                self.next_id += 1;
                self.local
                    .push(LocalSpace::new(id, kind, segment.bottom, segment.words));
                log::trace!(
                    "[MGC] new {} space {} at {:#x}, {} words",
                    kind,
                    id,
                    segment.bottom,
                    segment.words
                );
                true
            }
            None => false,
        }
    }

    /// Remove the local space at `index` and return its memory to the source
    ///
    /// Only empty spaces may be deleted.
    pub fn delete_segment(&mut self, index: usize) -> Result<()> {
        let space = self.local.get(index).ok_or_else(|| {
            GcError::InvariantViolation(format!(
                "no local space at index {} (have {})",
                index,
                self.local.len()
            ))
        })?;
        if !space.is_empty() {
            return Err(GcError::InvariantViolation(format!(
                "space {} still holds {} words and cannot be deleted",
                space.id(),
                space.in_use_words()
            )));
        }

        let space = self.local.remove(index);
        let segment = Segment {
            bottom: space.bottom(),
            words: space.size(),
        };
        self.source.release(segment, space.kind())
    }

    /// Register a permanent space covering `[bottom, top)`
    pub fn add_permanent_space(&mut self, bottom: usize, top: usize) {
        self.permanent.push(PermanentSpace::new(bottom, top));
    }

    pub fn local_spaces(&self) -> &[LocalSpace] {
        &self.local
    }

    pub fn local_spaces_mut(&mut self) -> &mut [LocalSpace] {
        &mut self.local
    }

    pub fn permanent_spaces(&self) -> &[PermanentSpace] {
        &self.permanent
    }

    pub fn permanent_spaces_mut(&mut self) -> &mut [PermanentSpace] {
        &mut self.permanent
    }

    /// Local spaces of one partition, in creation order
    pub fn spaces_of(&self, kind: SpaceKind) -> impl Iterator<Item = &LocalSpace> + '_ {
        self.local.iter().filter(move |space| space.kind() == kind)
    }

    /// Total capacity of a partition
    pub fn capacity_words(&self, kind: SpaceKind) -> usize {
        self.spaces_of(kind).map(LocalSpace::size).sum()
    }

    /// Total free words of a partition
    pub fn free_words(&self, kind: SpaceKind) -> usize {
        self.spaces_of(kind).map(LocalSpace::free_words).sum()
    }

    /// Words currently handed out by the segment source
    pub fn reserved_words(&self) -> usize {
        self.source.reserved_words()
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("local", &self.local.len())
            .field("permanent", &self.permanent.len())
            .field("reserved_words", &self.source.reserved_words())
            .finish()
    }
}
