//! Statistical imputation.
//!
//! One fill value per column: median for numeric columns, mode for
//! categorical and text columns, and the constant `"Unknown"` for a text
//! column with nothing to take a mode from.

use crate::dataset::{Dataset, Record, Value};
use crate::error::{RefineryError, Result};
use crate::pipeline::StageContext;
use crate::profiler::classify;
use crate::reporting::codes;
use crate::types::{ColumnType, Severity};
use crate::utils::{median, mode, truncate_str};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Fill for text columns without any present value.
pub const UNKNOWN_FILL: &str = "Unknown";

/// How a column's fill value was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    Median,
    Mode,
    Constant,
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Median => f.write_str("median"),
            Self::Mode => f.write_str("mode"),
            Self::Constant => f.write_str("constant"),
        }
    }
}

/// Choose the fill value for a column from its present values.
///
/// The column type is inferred on `present` alone. Numeric fills are
/// always [`Value::Number`].
///
/// # Errors
///
/// [`RefineryError::NoValidValues`] when a numeric column yields no finite
/// median.
pub fn fill_value(column: &str, present: &[&Value]) -> Result<(FillStrategy, Value)> {
    match classify(present.iter().copied()) {
        ColumnType::Numeric => {
            let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_number()).collect();
            median(&numbers)
                .filter(|m| m.is_finite())
                .map(|m| (FillStrategy::Median, Value::Number(m)))
                .ok_or_else(|| RefineryError::NoValidValues(column.to_string()))
        }
        ColumnType::Categorical => mode(present.iter().copied())
            .map(|m| (FillStrategy::Mode, m))
            .ok_or_else(|| RefineryError::NoValidValues(column.to_string())),
        ColumnType::Text => Ok(match mode(present.iter().copied()) {
            Some(m) => (FillStrategy::Mode, m),
            None => (FillStrategy::Constant, Value::text(UNKNOWN_FILL)),
        }),
    }
}

/// Fills every missing cell of a column with one statistical estimate.
#[derive(Debug, Default)]
pub struct Imputer;

impl Imputer {
    pub fn new() -> Self {
        Self
    }

    /// Impute all columns; returns the new dataset and the number of filled
    /// cells.
    ///
    /// A column whose fill value cannot be computed is left as is and
    /// reported as a medium-severity warning; the other columns still run.
    pub fn impute(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<(Dataset, usize)> {
        let mut records: Vec<Record> = dataset.records().to_vec();
        let width = dataset.width();
        let mut filled = 0;
        let mut columns_filled = 0;

        for (index, column) in dataset.columns().iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.column_progress(column, index, width);

            let values = dataset.column_at(index);
            let (missing, present): (Vec<(usize, &Value)>, Vec<(usize, &Value)>) = values
                .iter()
                .copied()
                .enumerate()
                .partition(|(_, v)| v.is_missing());
            if missing.is_empty() {
                continue;
            }
            let present: Vec<&Value> = present.into_iter().map(|(_, v)| v).collect();

            match fill_value(column, &present) {
                Ok((strategy, value)) => {
                    debug!(
                        "Filling {} missing values in '{}' with {} '{}'",
                        missing.len(),
                        column,
                        strategy,
                        truncate_str(&value.to_label(), 40)
                    );
                    for (row, _) in &missing {
                        records[*row].set_at(index, value.clone());
                    }
                    filled += missing.len();
                    columns_filled += 1;
                }
                Err(e) => {
                    warn!("Skipping imputation of '{}': {}", column, e);
                    ctx.warn(
                        codes::IMPUTATION_COLUMN_FAILED,
                        format!(
                            "Could not impute {} missing values in column '{}': {}",
                            missing.len(),
                            column,
                            e
                        ),
                        Severity::Medium,
                    );
                }
            }
        }

        ctx.warn(
            codes::MISSING_VALUE_COMPLETE,
            format!(
                "Filled {} missing values across {} columns",
                filled, columns_filled
            ),
            Severity::Low,
        );
        info!("Imputation filled {} values", filled);

        Ok((
            Dataset::from_aligned(dataset.columns().to_vec(), records),
            filled,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CancellationToken;
    use crate::reporting::RunReport;
    use pretty_assertions::assert_eq;

    fn impute(ds: &Dataset) -> (Dataset, usize, RunReport) {
        let report = RunReport::new();
        let token = CancellationToken::new();
        let (out, filled) = Imputer::new()
            .impute(ds, &StageContext::new(&report, &token))
            .unwrap();
        (out, filled, report)
    }

    fn single_column(name: &str, values: Vec<Value>) -> Dataset {
        Dataset::from_rows(vec![name.to_string()], values.into_iter().map(|v| vec![v]).collect())
            .unwrap()
    }

    #[test]
    fn test_numeric_median_even_count() {
        let ds = single_column(
            "x",
            vec![
                Value::text("1"),
                Value::text("2"),
                Value::Missing,
                Value::text("3"),
                Value::text("4"),
            ],
        );

        let (out, filled, _) = impute(&ds);

        assert_eq!(filled, 1);
        assert_eq!(out.records()[2].value_at(0), &Value::Number(2.5));
        // Present cells keep their original representation
        assert_eq!(out.records()[0].value_at(0), &Value::text("1"));
    }

    #[test]
    fn test_categorical_mode_tie_break() {
        let (strategy, value) = fill_value(
            "sex",
            &[&Value::text("M"), &Value::text("M"), &Value::text("F")],
        )
        .unwrap();
        assert_eq!(value, Value::text("M"));
        assert_ne!(strategy, FillStrategy::Median);
    }

    #[test]
    fn test_all_missing_column_becomes_unknown() {
        let ds = single_column("notes", vec![Value::Missing, Value::text(""), Value::text("n/a")]);

        let (out, filled, _) = impute(&ds);

        assert_eq!(filled, 3);
        assert!(out.column_at(0).iter().all(|v| **v == Value::text(UNKNOWN_FILL)));
    }

    #[test]
    fn test_no_missing_markers_remain() {
        let ds = Dataset::new(vec![
            Record::new().with("age", "30").with("city", "Oslo").with("note", Value::Missing),
            Record::new().with("age", "NULL").with("city", "none").with("note", "  "),
            Record::new().with("age", "40").with("city", "Oslo").with("note", "ok"),
        ])
        .unwrap();

        let (out, filled, report) = impute(&ds);

        assert_eq!(filled, 4);
        assert!(out.records().iter().all(|r| r.iter().all(|(_, v)| !v.is_missing())));
        assert_eq!(out.records()[1].get("age"), Some(&Value::Number(35.0)));
        assert_eq!(out.records()[1].get("city"), Some(&Value::text("Oslo")));
        let summary = report
            .warnings()
            .into_iter()
            .find(|w| w.kind == codes::MISSING_VALUE_COMPLETE)
            .unwrap();
        assert!(summary.message.contains("Filled 4"));
    }

    #[test]
    fn test_median_of_huge_values_stays_finite() {
        let ds = Dataset::new(vec![
            Record::new().with("big", "1.7e308").with("small", "1"),
            Record::new().with("big", "1.7e308").with("small", Value::Missing),
            Record::new().with("big", Value::Missing).with("small", "3"),
        ])
        .unwrap();

        let (out, filled, report) = impute(&ds);

        assert_eq!(filled, 2);
        assert_eq!(out.records()[2].get("big"), Some(&Value::Number(1.7e308)));
        assert_eq!(out.records()[1].get("small"), Some(&Value::Number(2.0)));
        assert!(
            report
                .warnings()
                .iter()
                .all(|w| w.kind != codes::IMPUTATION_COLUMN_FAILED)
        );
    }

    #[test]
    fn test_input_not_mutated() {
        let ds = single_column("x", vec![Value::text("5"), Value::Missing]);
        let before = ds.clone();
        let _ = impute(&ds);
        assert_eq!(ds, before);
    }
}
