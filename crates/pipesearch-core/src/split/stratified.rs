//! Stratified split and sample, preserving per-category proportions.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::dataset::TableData;
use crate::error::{CoreError, CoreResult};

use super::SplitConfig;

/// Bucket row indices by the value of the category column.
///
/// Insertion order of categories is made deterministic by sorting bucket
/// keys, so seeded runs reproduce exactly.
fn bucket_rows(table: &TableData, category_col: usize) -> CoreResult<Vec<(String, Vec<usize>)>> {
    if category_col >= table.header.len() {
        return Err(CoreError::Split(format!(
            "category column index {} out of bounds for {} columns",
            category_col,
            table.header.len()
        )));
    }

    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in table.rows.iter().enumerate() {
        let value = row.get(category_col).cloned().unwrap_or_default();
        buckets.entry(value).or_default().push(idx);
    }

    let mut ordered: Vec<(String, Vec<usize>)> = buckets.into_iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(ordered)
}

/// Proportional quota for one category: `ceil(size / total * limit)` with
/// a floor of one row per non-empty category.
fn quota(size: usize, total: usize, limit: usize) -> usize {
    if total == 0 || size == 0 {
        return 0;
    }
    let share = (size as f64 / total as f64 * limit as f64).ceil() as usize;
    share.max(1).min(size)
}

/// Partition every row into train/test, keeping each category's share of
/// the train side proportional to its share of the dataset.
///
/// A category whose entire quota would land in train gives one row back
/// to test when it has at least two rows; singleton categories stay on
/// the train side only.
pub(crate) fn split(
    table: &TableData,
    config: &SplitConfig,
    rng: &mut StdRng,
) -> CoreResult<(Vec<Vec<String>>, Vec<Vec<String>>)> {
    let category_col = config.grouping_col.unwrap_or(config.target_col);
    let buckets = bucket_rows(table, category_col)?;

    let n = table.len();
    let (train_count, _) = config.row_limits.row_counts(n, config.train_ratio);

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_, mut indices) in buckets {
        indices.shuffle(rng);

        let mut take = quota(indices.len(), n, train_count);
        if take == indices.len() && indices.len() >= 2 {
            take -= 1;
        }

        for (pos, idx) in indices.into_iter().enumerate() {
            let row = table.rows[idx].clone();
            if pos < take {
                train.push(row);
            } else {
                test.push(row);
            }
        }
    }

    Ok((train, test))
}

/// Proportional subsample of roughly `limit` rows.
///
/// Each category contributes `ceil(size / total * limit)` rows with a
/// floor of one, so no present category vanishes; the rounded-up quotas
/// may overshoot `limit` by a few rows.
pub(crate) fn sample(
    table: &TableData,
    category_col: usize,
    limit: usize,
    rng: &mut StdRng,
) -> CoreResult<Vec<Vec<String>>> {
    let buckets = bucket_rows(table, category_col)?;
    let n = table.len();

    let mut out = Vec::new();
    for (_, mut indices) in buckets {
        indices.shuffle(rng);
        let take = quota(indices.len(), n, limit);
        for idx in indices.into_iter().take(take) {
            out.push(table.rows[idx].clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn category_table(counts: &[(&str, usize)]) -> TableData {
        let mut rows = Vec::new();
        let mut id = 0;
        for (cat, count) in counts {
            for _ in 0..*count {
                rows.push(vec![id.to_string(), cat.to_string()]);
                id += 1;
            }
        }
        TableData::new(vec!["id".into(), "category".into()], rows)
    }

    #[test]
    fn test_quota_floor() {
        assert_eq!(quota(1, 11, 10), 1);
        assert_eq!(quota(0, 11, 10), 0);
        assert_eq!(quota(6, 11, 10), 6);
    }

    #[test]
    fn test_sample_proportional_with_floor() {
        // {a:6, b:3, c:1, d:1} sampled to 10 rows.
        let table = category_table(&[("a", 6), ("b", 3), ("c", 1), ("d", 1)]);
        let mut rng = StdRng::seed_from_u64(7);

        let rows = sample(&table, 1, 10, &mut rng).unwrap();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for row in &rows {
            *counts.entry(row[1].clone()).or_default() += 1;
        }

        // Proportional within rounding, and no category vanishes.
        assert_eq!(counts["a"], 6);
        assert_eq!(counts["b"], 3);
        assert_eq!(counts["c"], 1);
        assert_eq!(counts["d"], 1);
    }

    #[test]
    fn test_missing_category_column() {
        let table = category_table(&[("a", 2)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample(&table, 9, 10, &mut rng).is_err());
    }
}
