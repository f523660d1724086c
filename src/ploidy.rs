//! Ploidy comparison methods used by every chaining rule
//!

use serde::{Deserialize, Serialize};

/// Two ploidy values within this absolute difference are considered equal
pub const DEFAULT_PLOIDY_ABS_MARGIN: f64 = 0.2;

/// Two ploidy values within this fraction of the larger value are considered equal
pub const DEFAULT_PLOIDY_REL_MARGIN: f64 = 0.05;

/// Residual ploidy at or below this level is treated as fully consumed
pub const MIN_UNLINKED_PLOIDY: f64 = 1e-6;

/// Tolerance settings for the ploidy equality test
///
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PloidyTolerance {
    pub abs_margin: f64,
    pub rel_margin: f64,
}

impl Default for PloidyTolerance {
    fn default() -> Self {
        Self {
            abs_margin: DEFAULT_PLOIDY_ABS_MARGIN,
            rel_margin: DEFAULT_PLOIDY_REL_MARGIN,
        }
    }
}

impl PloidyTolerance {
    /// True if the two ploidy values are effectively the same
    ///
    /// The values are equal if their difference is within either the absolute margin, or the
    /// relative margin of the larger magnitude value.
    ///
    pub fn ploidy_equal(&self, ploidy1: f64, ploidy2: f64) -> bool {
        let diff = (ploidy1 - ploidy2).abs();
        if diff <= self.abs_margin {
            return true;
        }
        let max_ploidy = ploidy1.abs().max(ploidy2.abs());
        max_ploidy > 0.0 && (diff / max_ploidy) <= self.rel_margin
    }
}

/// True if the closed intervals `ploidy +/- uncertainty` of the two values intersect
///
pub fn ploidy_overlap(ploidy1: f64, uncertainty1: f64, ploidy2: f64, uncertainty2: f64) -> bool {
    let (uncertainty1, uncertainty2) = (uncertainty1.abs(), uncertainty2.abs());
    (ploidy1 - uncertainty1) <= (ploidy2 + uncertainty2)
        && (ploidy2 - uncertainty2) <= (ploidy1 + uncertainty1)
}

/// True if a residual ploidy value should be treated as zero
///
pub fn is_exhausted(ploidy: f64) -> bool {
    ploidy <= 0.0 || approx::abs_diff_eq!(ploidy, 0.0, epsilon = MIN_UNLINKED_PLOIDY)
}

pub fn format_ploidy(ploidy: f64) -> String {
    format!("{ploidy:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ploidy_equal() {
        let tol = PloidyTolerance::default();
        assert!(tol.ploidy_equal(2.0, 2.0));
        assert!(tol.ploidy_equal(2.0, 2.15));
        assert!(!tol.ploidy_equal(3.0, 3.3));

        // Large values should be matched by the relative margin
        assert!(tol.ploidy_equal(20.0, 20.9));
        assert!(!tol.ploidy_equal(20.0, 22.0));

        assert!(tol.ploidy_equal(0.0, 0.0));
    }

    #[test]
    fn test_ploidy_equal_custom_margins() {
        let tol = PloidyTolerance {
            abs_margin: 0.5,
            rel_margin: 0.0,
        };
        assert!(tol.ploidy_equal(3.0, 3.3));
        assert!(!tol.ploidy_equal(20.0, 20.9));
    }

    #[test]
    fn test_ploidy_overlap() {
        assert!(ploidy_overlap(3.0, 0.5, 3.3, 0.5));
        assert!(ploidy_overlap(3.3, 0.5, 3.0, 0.5));

        // Touching intervals count as overlapping
        assert!(ploidy_overlap(1.0, 0.5, 2.0, 0.5));

        assert!(!ploidy_overlap(1.0, 0.2, 2.0, 0.2));
        assert!(!ploidy_overlap(2.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_is_exhausted() {
        assert!(is_exhausted(0.0));
        assert!(is_exhausted(-1.0));
        assert!(is_exhausted(1e-9));
        assert!(!is_exhausted(0.01));
    }
}
