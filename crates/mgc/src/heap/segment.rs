//! Segment Sources - Backing Memory for Local Spaces
//!
//! The memory manager asks a `SegmentSource` for address ranges when the heap
//! sizer wants more capacity, and hands them back when an empty space is
//! deleted. Requests are best-effort: a source refuses by returning `None`,
//! and the sizer degrades the request size.
//!
//! Two sources are provided:
//! - `MmapSegmentSource` maps anonymous memory with `memmap2`
//! - `ReservedSegmentSource` hands out ranges of a reserved word window
//!   without touching memory, for embedders that manage memory themselves

use super::SpaceKind;
use crate::error::{GcError, Result};
use crate::util::{Alignment, WORD_BYTES};
use memmap2::MmapMut;
use std::collections::HashMap;

/// A word range handed out by a segment source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Word address of the first word
    pub bottom: usize,
    /// Length in words
    pub words: usize,
}

/// Best-effort provider of segment address ranges
pub trait SegmentSource: Send {
    /// Reserve at least `words` words, or refuse with `None`
    fn reserve(&mut self, words: usize, kind: SpaceKind) -> Option<Segment>;

    /// Return a segment obtained from `reserve`
    fn release(&mut self, segment: Segment, kind: SpaceKind) -> Result<()>;

    /// Words currently handed out
    fn reserved_words(&self) -> usize;
}

/// Anonymous-mapping segment source
///
/// Each segment is its own mapping, rounded up to the system page size.
/// The optional limit caps the total words mapped at any time.
pub struct MmapSegmentSource {
    mappings: HashMap<usize, MmapMut>,
    reserved: usize,
    limit: Option<usize>,
    page_words: usize,
}

impl MmapSegmentSource {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            mappings: HashMap::new(),
            reserved: 0,
            limit,
            page_words: (page_size::get() / WORD_BYTES).max(1),
        }
    }

    /// Number of live mappings
    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}

impl SegmentSource for MmapSegmentSource {
    fn reserve(&mut self, words: usize, kind: SpaceKind) -> Option<Segment> {
        let words = Alignment::round_up(words.max(1), self.page_words);
        if let Some(limit) = self.limit {
            if self.reserved.checked_add(words).map_or(true, |total| total > limit) {
                log::debug!(
                    "[MGC] {:?} segment of {} words refused: limit {} words, {} in use",
                    kind,
                    words,
                    limit,
                    self.reserved
                );
                return None;
            }
        }

        let bytes = words.checked_mul(WORD_BYTES)?;
        match MmapMut::map_anon(bytes) {
            Ok(map) => {
                let bottom = map.as_ptr() as usize / WORD_BYTES;
                self.mappings.insert(bottom, map);
                self.reserved += words;
                Some(Segment { bottom, words })
            }
            Err(e) => {
                log::debug!("[MGC] mapping {} bytes for {:?} segment failed: {}", bytes, kind, e);
                None
            }
        }
    }

    fn release(&mut self, segment: Segment, kind: SpaceKind) -> Result<()> {
        match self.mappings.remove(&segment.bottom) {
            Some(map) => {
                self.reserved -= map.len() / WORD_BYTES;
                Ok(())
            }
            None => Err(GcError::SegmentSource {
                kind,
                words: segment.words,
                reason: format!("no mapping at word address {:#x}", segment.bottom),
            }),
        }
    }

    fn reserved_words(&self) -> usize {
        self.reserved
    }
}

/// Address-only segment source over a reserved word window
///
/// Segments are carved from `[base, base + capacity)` bottom-up. Released
/// ranges are kept and reused first-fit; adjacent free ranges are not merged.
#[derive(Debug)]
pub struct ReservedSegmentSource {
    base: usize,
    capacity: usize,
    next: usize,
    released: Vec<Segment>,
    reserved: usize,
}

impl ReservedSegmentSource {
    /// Window of `capacity` words starting at word address `base`
    pub fn new(base: usize, capacity: usize) -> Self {
        Self {
            base,
            capacity,
            next: 0,
            released: Vec::new(),
            reserved: 0,
        }
    }

    /// Words still available to be reserved
    pub fn remaining_words(&self) -> usize {
        self.capacity - self.reserved
    }
}

impl SegmentSource for ReservedSegmentSource {
    fn reserve(&mut self, words: usize, _kind: SpaceKind) -> Option<Segment> {
        if words == 0 {
            return None;
        }

        if let Some(pos) = self.released.iter().position(|s| s.words >= words) {
            let free = self.released.swap_remove(pos);
            if free.words > words {
                self.released.push(Segment {
                    bottom: free.bottom + words,
                    words: free.words - words,
                });
            }
            self.reserved += words;
            return Some(Segment {
                bottom: free.bottom,
                words,
            });
        }

        let end = self.next.checked_add(words)?;
        if end > self.capacity {
            return None;
        }
        let segment = Segment {
            bottom: self.base.checked_add(self.next)?,
            words,
        };
        segment.bottom.checked_add(words)?;
        self.next += words;
        self.reserved += words;
        Some(segment)
    }

    fn release(&mut self, segment: Segment, kind: SpaceKind) -> Result<()> {
        let end = self.base + self.next;
        let inside = segment
            .bottom
            .checked_add(segment.words)
            .is_some_and(|top| segment.bottom >= self.base && top <= end);
        if !inside {
            return Err(GcError::SegmentSource {
                kind,
                words: segment.words,
                reason: format!("range at {:#x} is outside the reserved window", segment.bottom),
            });
        }
        self.reserved -= segment.words;
        self.released.push(segment);
        Ok(())
    }

    fn reserved_words(&self) -> usize {
        self.reserved
    }
}
