//! Column type inference.

use crate::dataset::Value;
use crate::types::ColumnType;

/// Share of present values that must parse as numbers for a Numeric column.
pub const NUMERIC_SHARE_THRESHOLD: f64 = 0.8;

/// Distinct/present ratio below which a non-numeric column is Categorical.
pub const CATEGORICAL_UNIQUE_RATIO: f64 = 0.1;

/// Classify a column from its values.
///
/// Missing values are ignored. An all-missing column is [`ColumnType::Text`]
/// since there is nothing to infer from.
pub fn classify<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let present: Vec<&Value> = values.into_iter().filter(|v| !v.is_missing()).collect();
    if present.is_empty() {
        return ColumnType::Text;
    }

    let numeric = present.iter().filter(|v| v.as_number().is_some()).count();
    if numeric as f64 >= NUMERIC_SHARE_THRESHOLD * present.len() as f64 {
        return ColumnType::Numeric;
    }

    match crate::utils::unique_stats(present.iter().copied()) {
        Some((_, ratio)) if ratio < CATEGORICAL_UNIQUE_RATIO => ColumnType::Categorical,
        _ => ColumnType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::text(*s)).collect()
    }

    #[test]
    fn test_all_missing_is_text() {
        let values = vec![Value::Missing, Value::text(""), Value::text("null")];
        assert_eq!(classify(&values), ColumnType::Text);
        assert_eq!(classify(&Vec::<Value>::new()), ColumnType::Text);
    }

    #[test]
    fn test_numeric_threshold() {
        // 4 of 5 present values parse: exactly 80%
        let values = strings(&["1", "2.5", "-3", "4e2", "abc", ""]);
        assert_eq!(classify(&values), ColumnType::Numeric);

        // 3 of 5 parse: below threshold
        let values = strings(&["1", "2", "3", "x", "y"]);
        assert_ne!(classify(&values), ColumnType::Numeric);
    }

    #[test]
    fn test_native_numbers() {
        let values = vec![Value::Number(1.0), Value::Number(2.0), Value::Missing];
        assert_eq!(classify(&values), ColumnType::Numeric);
    }

    #[test]
    fn test_categorical_by_unique_ratio() {
        let mut values = Vec::new();
        for i in 0..30 {
            values.push(Value::text(if i % 2 == 0 { "red" } else { "blue" }));
        }
        assert_eq!(classify(&values), ColumnType::Categorical);
    }

    #[test]
    fn test_high_cardinality_is_text() {
        let values = strings(&["alpha", "beta", "gamma", "delta"]);
        assert_eq!(classify(&values), ColumnType::Text);
    }

    #[test]
    fn test_deterministic() {
        let values = strings(&["a", "b", "a", "c"]);
        assert_eq!(classify(&values), classify(&values));
    }
}
