//! Error Module - MGC Error Types
//!
//! Defines all error types used in MGC.
//!
//! # Error Categories
//!
//! ## Allocation Errors
//! - `OutOfMemory` - A full collection could not free enough space
//! - `SegmentSource` - The backing store refused to map or unmap a segment
//!
//! ## Setup Errors
//! - `Configuration` - Invalid tuning configuration
//! - `TaskFarm` - The worker pool could not be built
//! - `AlreadyInitialized` - Process-wide state initialised twice
//!
//! ## Heap Corruption
//! - `InvariantViolation` - A heap invariant no longer holds. The driver
//!   never recovers from this; it is handed to the fatal-error hook.
//!
//! Soft shortfalls (a growth request that was refused) are not errors at all:
//! the heap sizer degrades the request and carries on with what it has.

use crate::heap::SpaceKind;
use thiserror::Error;

/// Main error type for all MGC operations
///
/// # Examples
///
/// ```rust
/// use mgc::GcError;
///
/// fn handle_error(err: GcError) {
///     match err {
///         GcError::OutOfMemory { requested_words } => {
///             eprintln!("OOM: could not find {} words", requested_words);
///         }
///         _ => {
///             eprintln!("Other error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum GcError {
    /// Out of memory - heap exhaustion
    ///
    /// **When returned:** a full collection finished but the heap is still
    /// short even against the minor-collection thresholds.
    ///
    /// **Recovery strategy:** fail the pending allocation.
    #[error("Out of memory: could not make {requested_words} words available")]
    OutOfMemory { requested_words: usize },

    /// Configuration error
    ///
    /// **When returned:** `TuningConfig::validate` rejected the configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Worker pool could not be created
    ///
    /// **When returned:** the rayon pool backing the task farm failed to build
    #[error("Task farm error: {0}")]
    TaskFarm(String),

    /// Process-wide state was already initialised
    #[error("{0} is already initialised")]
    AlreadyInitialized(&'static str),

    /// Heap invariant violation
    ///
    /// **When returned:** bounds, bitmap or phase accounting checks failed.
    ///
    /// **Recovery strategy:** none - the heap is corrupt
    #[error("Heap invariant violated: {0}")]
    InvariantViolation(String),

    /// Segment source failure
    ///
    /// **When returned:** mapping or unmapping backing memory failed
    #[error("Segment source error for {kind:?} segment of {words} words: {reason}")]
    SegmentSource {
        kind: SpaceKind,
        words: usize,
        reason: String,
    },
}

impl GcError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GcError::OutOfMemory { .. } | GcError::SegmentSource { .. }
        )
    }

    /// Check if this error indicates heap corruption or a bug in a collaborator
    pub fn is_bug(&self) -> bool {
        matches!(self, GcError::InvariantViolation(_))
    }
}

impl From<crate::config::ConfigError> for GcError {
    fn from(err: crate::config::ConfigError) -> Self {
        GcError::Configuration(err.to_string())
    }
}

/// Result type alias for MGC operations
pub type Result<T> = std::result::Result<T, GcError>;

/// Ensure condition is true, otherwise return an invariant violation
#[macro_export]
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::error::GcError::InvariantViolation(format!($($arg)*)));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_is_recoverable() {
        let err = GcError::OutOfMemory { requested_words: 10 };
        assert!(err.is_recoverable());
        assert!(!err.is_bug());
        assert!(err.to_string().contains("10 words"));
    }

    #[test]
    fn test_invariant_violation_is_bug() {
        let err = GcError::InvariantViolation("pointer below bottom".to_string());
        assert!(err.is_bug());
        assert!(!err.is_recoverable());
    }

    fn checked(value: usize) -> Result<usize> {
        ensure_invariant!(value < 10, "value {} out of range", value);
        Ok(value)
    }

    #[test]
    fn test_ensure_invariant_macro() {
        assert!(checked(3).is_ok());
        assert!(matches!(checked(12), Err(GcError::InvariantViolation(_))));
    }
}
