//! Mark Bitmap - Tracking Marked Words
//!
//! One bit per heap word of a local space. The mark phase sets the bits of
//! every reachable word; the copy phase sets bits again at an object's new
//! location. The driver clears the current-generation prefix at the end of
//! every cycle so the bitmap is clean between cycles.
//!
//! Bitmap Structure:
//! ```text
//! Space: 1Mi words
//! Granularity: 1 word per bit
//! Bitmap size: 1Mi bits = 16Ki u64 words
//!
//! Word at offset 130 from the space bottom:
//! - Word index: 130 / 64 = 2
//! - Bit offset: 130 % 64 = 2
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const BITS_PER_WORD: usize = u64::BITS as usize;

/// Bitmap - one mark bit per heap word
///
/// Bits are atomic so that parallel mark workers can set bits through a
/// shared reference. The driver itself only touches the bitmap while the
/// workers are quiescent, so `Relaxed` ordering is enough everywhere.
pub struct Bitmap {
    /// Raw bitmap data
    bits: Vec<AtomicU64>,

    /// Number of heap words covered
    len: usize,
}

impl Bitmap {
    /// Create a clean bitmap covering `len` words
    pub fn new(len: usize) -> Self {
        let word_count = len.div_ceil(BITS_PER_WORD);
        let bits = (0..word_count).map(|_| AtomicU64::new(0)).collect();

        Self { bits, len }
    }

    /// Number of words covered
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the bitmap covers no words
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the bit for word `index`
    pub fn set_bit(&self, index: usize) {
        debug_assert!(index < self.len, "bit {} outside bitmap of {}", index, self.len);
        let (word, bit) = split(index);
        if let Some(cell) = self.bits.get(word) {
            cell.fetch_or(1 << bit, Ordering::Relaxed);
        }
    }

    /// Set the bits for `count` words starting at `start`
    pub fn set_range(&self, start: usize, count: usize) {
        self.update_range(start, count, |cell, mask| {
            cell.fetch_or(mask, Ordering::Relaxed);
        });
    }

    /// Check the bit for word `index`
    pub fn test_bit(&self, index: usize) -> bool {
        let (word, bit) = split(index);
        match self.bits.get(word) {
            Some(cell) => cell.load(Ordering::Relaxed) & (1 << bit) != 0,
            None => false,
        }
    }

    /// Clear `count` bits starting at `start`
    pub fn clear_bits(&self, start: usize, count: usize) {
        self.update_range(start, count, |cell, mask| {
            cell.fetch_and(!mask, Ordering::Relaxed);
        });
    }

    /// Clear every bit
    pub fn clear(&self) {
        for cell in &self.bits {
            cell.store(0, Ordering::Relaxed);
        }
    }

    /// Count set bits
    pub fn count_set(&self) -> usize {
        self.bits
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    /// First set bit at or after `from`, if any
    pub fn first_set_from(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let (mut word, bit) = split(from);
        let mut current = self.bits[word].load(Ordering::Relaxed) & (!0u64 << bit);
        loop {
            if current != 0 {
                let index = word * BITS_PER_WORD + current.trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
            word += 1;
            if word >= self.bits.len() {
                return None;
            }
            current = self.bits[word].load(Ordering::Relaxed);
        }
    }

    /// True if no bit at or after `from` is set
    pub fn is_clear_from(&self, from: usize) -> bool {
        self.first_set_from(from).is_none()
    }

    /// Get bitmap size in bytes
    pub fn size_bytes(&self) -> usize {
        self.bits.len() * std::mem::size_of::<u64>()
    }

    fn update_range(&self, start: usize, count: usize, apply: impl Fn(&AtomicU64, u64)) {
        let end = start.saturating_add(count).min(self.len);
        let mut index = start;
        while index < end {
            let (word, bit) = split(index);
            let span = (BITS_PER_WORD - bit).min(end - index);
            let mask = if span == BITS_PER_WORD {
                !0u64
            } else {
                ((1u64 << span) - 1) << bit
            };
            apply(&self.bits[word], mask);
            index += span;
        }
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("len", &self.len)
            .field("set", &self.count_set())
            .finish()
    }
}

#[inline]
fn split(index: usize) -> (usize, usize) {
    (index / BITS_PER_WORD, index % BITS_PER_WORD)
}
