//! Shared utilities for the refinery pipeline.
//!
//! This module contains common helper functions used across multiple modules
//! to reduce code duplication and ensure consistency.

use crate::dataset::Value;
use std::collections::HashMap;

// =============================================================================
// Missing Value Utilities
// =============================================================================

/// String markers treated as missing (compared case-insensitively after trim).
pub const MISSING_MARKERS: [&str; 5] = ["null", "undefined", "na", "n/a", "none"];

/// Check if a raw string is a missing-value marker.
///
/// Empty and whitespace-only strings are missing, as is any entry of
/// [`MISSING_MARKERS`].
///
/// # Example
///
/// ```rust,ignore
/// use lex_refinery::utils::is_missing_marker;
///
/// assert!(is_missing_marker("  "));
/// assert!(is_missing_marker("N/A"));
/// assert!(!is_missing_marker("0"));
/// ```
pub fn is_missing_marker(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    MISSING_MARKERS.iter().any(|&marker| lower == marker)
}

// =============================================================================
// Numeric Utilities
// =============================================================================

/// Parse a trimmed string as a finite `f64`.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a number, dropping the fractional part of integral values.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Round to two decimal places.
pub fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Median of a slice of numbers.
///
/// Sorts ascending; an even count averages the two middle elements.
/// Returns `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        // Halve first so two large finite values cannot overflow
        Some(sorted[mid - 1] / 2.0 + sorted[mid] / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Arithmetic mean and population standard deviation.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

// =============================================================================
// Frequency Utilities
// =============================================================================

/// Most frequent value; ties resolve to the value seen first.
pub fn mode<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Value> {
    let mut order: Vec<&'a Value> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for value in values {
        let count = counts.entry(value.key()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }

    // Strictly-greater comparison keeps the earliest value on ties.
    let mut best: Option<(&Value, usize)> = None;
    for value in order {
        let count = counts[&value.key()];
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.clone())
}

/// Count occurrences of each key, preserving first-seen order.
pub fn ordered_counts<I, K>(keys: I) -> Vec<(K, usize)>
where
    I: IntoIterator<Item = K>,
    K: Eq + std::hash::Hash + Clone,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();
    for key in keys {
        match index.get(&key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key.clone(), counts.len());
                counts.push((key, 1));
            }
        }
    }
    counts
}

/// Distinct/total ratio over present values; `None` if nothing is present.
pub fn unique_stats<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<(usize, f64)> {
    let keys: Vec<String> = values
        .into_iter()
        .filter(|v| !v.is_missing())
        .map(Value::key)
        .collect();
    if keys.is_empty() {
        return None;
    }
    let total = keys.len();
    let unique = ordered_counts(keys).len();
    Some((unique, unique as f64 / total as f64))
}

/// Truncate a string to `max_chars` characters with an ellipsis.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
