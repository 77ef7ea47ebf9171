//! Temporal threshold split, for forecasting tasks.

use crate::dataset::TableData;
use crate::error::{CoreError, CoreResult};

/// Parse the designated column of every row as a numeric timestamp.
fn parse_timestamps(table: &TableData, time_col: usize) -> CoreResult<Vec<f64>> {
    if time_col >= table.header.len() {
        return Err(CoreError::Split(format!(
            "time column index {} out of bounds for {} columns",
            time_col,
            table.header.len()
        )));
    }

    table
        .rows
        .iter()
        .map(|row| {
            let raw = row.get(time_col).map(String::as_str).unwrap_or("");
            raw.parse::<f64>().map_err(|_| {
                CoreError::Split(format!("unparseable timestamp value '{}'", raw))
            })
        })
        .collect()
}

/// Split on a single time threshold.
///
/// The threshold is the value at the `train_ratio` quantile of the sorted
/// timestamps; rows are then partitioned by comparison against it without
/// re-sorting, so original row order is preserved within each partition.
pub(crate) fn split(
    table: &TableData,
    time_col: usize,
    train_ratio: f64,
) -> CoreResult<(Vec<Vec<String>>, Vec<Vec<String>>)> {
    let n = table.len();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let values = parse_timestamps(table, time_col)?;

    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let k = ((n as f64 * train_ratio).ceil() as usize).clamp(1, n);
    let threshold = sorted[k - 1];

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (row, value) in table.rows.iter().zip(values.iter()) {
        if *value <= threshold {
            train.push(row.clone());
        } else {
            test.push(row.clone());
        }
    }

    Ok((train, test))
}

/// Keep the `limit` earliest rows, original order preserved.
pub(crate) fn sample(
    table: &TableData,
    time_col: usize,
    limit: usize,
) -> CoreResult<Vec<Vec<String>>> {
    let n = table.len();
    if limit >= n {
        return Ok(table.rows.clone());
    }

    let values = parse_timestamps(table, time_col)?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        values[*a]
            .partial_cmp(&values[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep: Vec<usize> = order.into_iter().take(limit).collect();
    keep.sort_unstable();

    Ok(keep.into_iter().map(|i| table.rows[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_table(values: &[f64]) -> TableData {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| vec![i.to_string(), v.to_string()])
            .collect();
        TableData::new(vec!["id".into(), "timestamp".into()], rows)
    }

    #[test]
    fn test_threshold_is_monotonic() {
        // Out-of-order arrival; the boundary must follow sorted time.
        let table = time_table(&[5.0, 1.0, 4.0, 2.0, 3.0, 9.0, 7.0, 8.0, 6.0, 10.0]);
        let (train, test) = split(&table, 1, 0.7).unwrap();

        assert_eq!(train.len() + test.len(), table.len());
        let max_train: f64 = train.iter().map(|r| r[1].parse().unwrap()).fold(f64::MIN, f64::max);
        let min_test: f64 = test.iter().map(|r| r[1].parse().unwrap()).fold(f64::MAX, f64::min);
        assert!(max_train < min_test);
    }

    #[test]
    fn test_partition_preserves_row_order() {
        let table = time_table(&[5.0, 1.0, 4.0, 2.0, 3.0]);
        let (train, _) = split(&table, 1, 0.6).unwrap();
        // Train rows appear in their original (unsorted) order.
        let ids: Vec<usize> = train.iter().map(|r| r[0].parse().unwrap()).collect();
        let mut sorted_ids = ids.clone();
        sorted_ids.sort_unstable();
        assert_eq!(ids, sorted_ids);
    }

    #[test]
    fn test_unparseable_timestamp() {
        let mut table = time_table(&[1.0, 2.0]);
        table.rows[1][1] = "not-a-time".into();
        let err = split(&table, 1, 0.5).unwrap_err();
        assert!(err.to_string().contains("not-a-time"));
    }

    #[test]
    fn test_sample_keeps_earliest() {
        let table = time_table(&[5.0, 1.0, 4.0, 2.0, 3.0]);
        let rows = sample(&table, 1, 2).unwrap();
        let values: Vec<f64> = rows.iter().map(|r| r[1].parse().unwrap()).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }
}
