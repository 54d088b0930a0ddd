//! Alignment Utilities
//!
//! Helper functions for rounding sizes to allocation units.

/// Alignment - utility for rounding operations
pub struct Alignment;

impl Alignment {
    /// Round value up to a multiple of `unit`
    ///
    /// `unit` need not be a power of two. Saturates instead of overflowing.
    ///
    /// # Examples
    /// ```
    /// use mgc::util::Alignment;
    ///
    /// assert_eq!(Alignment::round_up(100, 64), 128);
    /// assert_eq!(Alignment::round_up(128, 64), 128);
    /// assert_eq!(Alignment::round_up(10, 3), 12);
    /// ```
    pub fn round_up(value: usize, unit: usize) -> usize {
        if unit <= 1 {
            return value;
        }
        value.div_ceil(unit).saturating_mul(unit)
    }

    /// Check if value is a multiple of `unit`
    pub fn is_multiple(value: usize, unit: usize) -> bool {
        unit != 0 && value % unit == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(Alignment::round_up(0, 64), 0);
        assert_eq!(Alignment::round_up(1, 64), 64);
        assert_eq!(Alignment::round_up(65, 64), 128);
        assert_eq!(Alignment::round_up(7, 1), 7);
    }

    #[test]
    fn test_round_up_saturates() {
        assert_eq!(Alignment::round_up(usize::MAX - 3, 64), usize::MAX);
    }

    #[test]
    fn test_is_multiple() {
        assert!(Alignment::is_multiple(4096, 64));
        assert!(!Alignment::is_multiple(100, 64));
        assert!(!Alignment::is_multiple(100, 0));
    }
}
