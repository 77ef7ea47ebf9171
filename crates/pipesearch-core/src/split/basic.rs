//! Basic random split and sample.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::dataset::TableData;
use crate::error::CoreResult;

use super::SplitConfig;

/// Shuffle data rows and assign them to train/test.
///
/// The first `train_count` shuffled rows go to train and the next
/// `test_count` to test; once both row-limit-derived counts are
/// exhausted, each remaining row is assigned by a random draw against the
/// train ratio.
pub(crate) fn split(
    table: &TableData,
    config: &SplitConfig,
    rng: &mut StdRng,
) -> CoreResult<(Vec<Vec<String>>, Vec<Vec<String>>)> {
    let n = table.len();
    let (train_count, test_count) = config.row_limits.row_counts(n, config.train_ratio);

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    let mut train = Vec::with_capacity(train_count);
    let mut test = Vec::with_capacity(test_count);
    for idx in indices {
        let row = table.rows[idx].clone();
        if train.len() < train_count {
            train.push(row);
        } else if test.len() < test_count {
            test.push(row);
        } else if rng.gen_bool(config.train_ratio) {
            train.push(row);
        } else {
            test.push(row);
        }
    }

    Ok((train, test))
}

/// Uniform random subsample of at most `limit` rows, original order kept.
pub(crate) fn sample(table: &TableData, limit: usize, rng: &mut StdRng) -> Vec<Vec<String>> {
    let n = table.len();
    if limit >= n {
        return table.rows.clone();
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let mut keep: Vec<usize> = indices.into_iter().take(limit).collect();
    keep.sort_unstable();
    keep.into_iter().map(|i| table.rows[i].clone()).collect()
}
