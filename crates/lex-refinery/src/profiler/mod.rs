//! Data profiling module for dataset analysis.
//!
//! This module provides:
//! - Column type inference (numeric / categorical / text)
//! - Target column detection for class balancing
//! - Dataset statistics (missing cells, duplicate rows, column types)
//!
//! Every function here is pure; types are recomputed from whatever dataset
//! snapshot is passed in.

mod role_inference;
mod statistics;
mod type_inference;

pub use role_inference::{TARGET_KEYWORDS, detect_target_column};
pub use statistics::{compute_stats, count_duplicates, count_missing};
pub use type_inference::{CATEGORICAL_UNIQUE_RATIO, NUMERIC_SHARE_THRESHOLD, classify};

use crate::dataset::Dataset;
use crate::types::ColumnTypes;

/// Infer the type of every column of a dataset snapshot.
pub fn column_types(dataset: &Dataset) -> ColumnTypes {
    ColumnTypes::new(
        dataset
            .columns()
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), classify(dataset.column_at(index))))
            .collect(),
    )
}
