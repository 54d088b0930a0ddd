//! Util Module - Shared Utilities
//!
//! Utilities and helper functions used throughout MGC.

pub mod alignment;

pub use alignment::Alignment;

/// Bytes per heap word
pub const WORD_BYTES: usize = std::mem::size_of::<usize>();

/// Convert a byte count to whole words, rounding down
pub fn bytes_to_words(bytes: u64) -> u64 {
    bytes / WORD_BYTES as u64
}
