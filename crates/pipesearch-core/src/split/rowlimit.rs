//! Row-limit policy.
//!
//! A pure function of dataset size and configured bounds; every split and
//! sample operation derives its target row counts here.

use serde::{Deserialize, Serialize};

/// Configured bounds on partition sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowLimits {
    pub min_training_rows: usize,
    pub max_training_rows: usize,
    pub min_test_rows: usize,
    pub max_test_rows: usize,
    /// Fraction of rows retained when subsampling.
    pub sample_ratio: f64,
}

impl Default for RowLimits {
    fn default() -> Self {
        Self {
            min_training_rows: 100,
            max_training_rows: 100_000,
            min_test_rows: 100,
            max_test_rows: 100_000,
            sample_ratio: 0.2,
        }
    }
}

impl RowLimits {
    /// Target (train, test) row counts for a split over `available` rows.
    ///
    /// Each side is the ratio-derived share clamped into its configured
    /// band and capped by what is actually available. The two counts may
    /// sum to less than `available`; leftover rows are assigned by the
    /// split strategy itself.
    pub fn row_counts(&self, available: usize, train_ratio: f64) -> (usize, usize) {
        if available == 0 {
            return (0, 0);
        }

        let ideal_train = (available as f64 * train_ratio).round() as usize;
        let train = ideal_train
            .clamp(self.min_training_rows, self.max_training_rows)
            .min(available);

        let remaining = available - train;
        let test = (available - ideal_train.min(available))
            .clamp(self.min_test_rows, self.max_test_rows)
            .min(remaining);

        (train, test)
    }

    /// Target row count when subsampling `available` rows to one table.
    pub fn sample_count(&self, available: usize) -> usize {
        if available == 0 {
            return 0;
        }
        let sampled = (available as f64 * self.sample_ratio).round() as usize;
        sampled
            .clamp(self.min_training_rows, self.max_training_rows)
            .min(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(min_tr: usize, max_tr: usize, min_te: usize, max_te: usize) -> RowLimits {
        RowLimits {
            min_training_rows: min_tr,
            max_training_rows: max_tr,
            min_test_rows: min_te,
            max_test_rows: max_te,
            sample_ratio: 0.5,
        }
    }

    #[test]
    fn test_counts_respect_ratio() {
        let (train, test) = limits(0, 10_000, 0, 10_000).row_counts(1000, 0.9);
        assert_eq!(train, 900);
        assert_eq!(test, 100);
    }

    #[test]
    fn test_max_caps_apply() {
        let (train, test) = limits(0, 500, 0, 10_000).row_counts(1000, 0.9);
        assert_eq!(train, 500);
        // Test side keeps its own ratio-derived share.
        assert_eq!(test, 100);
    }

    #[test]
    fn test_never_exceeds_available() {
        let (train, test) = limits(100, 10_000, 100, 10_000).row_counts(50, 0.9);
        assert!(train <= 50);
        assert!(train + test <= 50);
    }

    #[test]
    fn test_empty_dataset() {
        assert_eq!(limits(100, 1000, 100, 1000).row_counts(0, 0.9), (0, 0));
        assert_eq!(limits(100, 1000, 100, 1000).sample_count(0), 0);
    }

    #[test]
    fn test_sample_count_clamped() {
        let l = limits(10, 300, 0, 0);
        // 0.5 * 1000 = 500, capped by max_training_rows.
        assert_eq!(l.sample_count(1000), 300);
        // 0.5 * 10 = 5, floored by min_training_rows, capped by available.
        assert_eq!(l.sample_count(10), 10);
    }
}
