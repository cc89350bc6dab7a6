//! Target column detection.

use crate::dataset::Dataset;
use crate::utils::unique_stats;
use tracing::debug;

/// Name fragments that mark a column as a class label.
pub const TARGET_KEYWORDS: [&str; 6] = ["label", "class", "category", "target", "outcome", "result"];

/// Upper bound (exclusive) on distinct values for a fallback target column.
const MAX_TARGET_CLASSES: usize = 10;

/// Auto-detect the class-label column.
///
/// First column whose lowercase name contains one of [`TARGET_KEYWORDS`];
/// otherwise the first column with a unique ratio below 0.1 and between
/// 2 and 9 distinct present values.
pub fn detect_target_column(dataset: &Dataset) -> Option<String> {
    let by_name = dataset.columns().iter().find(|name| {
        let lower = name.to_lowercase();
        TARGET_KEYWORDS.iter().any(|k| lower.contains(k))
    });
    if let Some(name) = by_name {
        debug!("Target column '{}' detected by name", name);
        return Some(name.clone());
    }

    let by_shape = dataset
        .columns()
        .iter()
        .enumerate()
        .find(|(index, _)| {
            matches!(
                unique_stats(dataset.column_at(*index)),
                Some((unique, ratio)) if ratio < 0.1 && unique > 1 && unique < MAX_TARGET_CLASSES
            )
        })
        .map(|(_, name)| name.clone());

    if let Some(name) = &by_shape {
        debug!("Target column '{}' detected by value distribution", name);
    }
    by_shape
}
