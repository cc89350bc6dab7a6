//! Dataset-level statistics.

use super::column_types;
use crate::dataset::{Dataset, Record};
use crate::types::Stats;
use std::collections::HashSet;

/// Compute row/column counts, missing cells, duplicates and column types.
pub fn compute_stats(dataset: &Dataset) -> Stats {
    Stats {
        total_rows: dataset.len(),
        total_columns: dataset.width(),
        missing_values: count_missing(dataset),
        duplicate_rows: count_duplicates(dataset),
        column_types: column_types(dataset),
    }
}

/// Number of cells satisfying the missing-value rule.
pub fn count_missing(dataset: &Dataset) -> usize {
    dataset
        .records()
        .iter()
        .map(|r| r.iter().filter(|(_, v)| v.is_missing()).count())
        .sum()
}

/// Rows that structurally equal an earlier row: `rows - distinct rows`.
pub fn count_duplicates(dataset: &Dataset) -> usize {
    let mut seen: HashSet<String> = HashSet::with_capacity(dataset.len());
    dataset
        .records()
        .iter()
        .filter(|r| !seen.insert(record_fingerprint(r)))
        .count()
}

/// Stable serialization of a record, field order preserved.
fn record_fingerprint(record: &Record) -> String {
    record
        .iter()
        .map(|(name, value)| format!("{}\u{1f}{}", name, value.key()))
        .collect::<Vec<_>>()
        .join("\u{1e}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Record, Value};
    use crate::types::ColumnType;

    #[test]
    fn test_all_identical_rows() {
        let records = vec![Record::new().with("a", "1").with("b", "x"); 5];
        let ds = Dataset::new(records).unwrap();
        assert_eq!(count_duplicates(&ds), 4);
    }

    #[test]
    fn test_number_and_string_are_distinct() {
        let ds = Dataset::new(vec![
            Record::new().with("a", "1"),
            Record::new().with("a", 1.0),
        ])
        .unwrap();
        assert_eq!(count_duplicates(&ds), 0);
    }

    #[test]
    fn test_compute_stats() {
        let ds = Dataset::new(vec![
            Record::new().with("age", "30").with("city", "Oslo"),
            Record::new().with("age", "").with("city", Value::Missing),
            Record::new().with("age", "41").with("city", "N/A"),
        ])
        .unwrap();

        let stats = compute_stats(&ds);
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.total_columns, 2);
        assert_eq!(stats.missing_values, 3);
        assert_eq!(stats.duplicate_rows, 0);
        assert_eq!(stats.column_types.get("age"), Some(ColumnType::Numeric));
        assert_eq!(stats.column_types.get("city"), Some(ColumnType::Text));
    }

    #[test]
    fn test_empty_dataset() {
        let stats = compute_stats(&Dataset::default());
        assert_eq!(stats.total_rows, 0);
        assert_eq!(stats.duplicate_rows, 0);
        assert!(stats.column_types.is_empty());
    }
}
