//! Core data model: values, records and datasets.
//!
//! A [`Dataset`] is an ordered sequence of [`Record`]s that all share the same
//! column list. Column order is the insertion order of the first record and is
//! preserved through every stage. Datasets are never mutated by the pipeline;
//! stages build new record vectors and wrap them in a new `Dataset`.

use crate::error::{RefineryError, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single scalar cell.
///
/// Serialized untagged: numbers as JSON numbers, strings as JSON strings and
/// `Missing` as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    String(String),
    #[default]
    Missing,
}

impl Value {
    /// Build a string value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Whether this cell counts as missing (see [`crate::utils::is_missing_marker`]).
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Number(n) => n.is_nan(),
            Value::String(s) => crate::utils::is_missing_marker(s),
        }
    }

    /// Numeric coercion: numbers pass through, strings are trimmed and parsed.
    ///
    /// Non-finite results are rejected.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Number(_) => None,
            Value::String(s) => crate::utils::parse_number(s),
            Value::Missing => None,
        }
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Stringified form used for class labels, grouping and CSV output.
    ///
    /// Integral numbers render without a fractional part, `Missing` renders
    /// as the empty string.
    pub fn to_label(&self) -> String {
        match self {
            Value::Number(n) => crate::utils::format_number(*n),
            Value::String(s) => s.clone(),
            Value::Missing => String::new(),
        }
    }

    /// Type-tagged key: two cells share a key iff they are structurally equal.
    pub(crate) fn key(&self) -> String {
        match self {
            Value::Number(n) => format!("n:{}", n),
            Value::String(s) => format!("s:{}", s),
            Value::Missing => "m".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_label())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Missing,
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Missing),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Bool(b) => Value::String(b.to_string()),
            other => Value::String(other.to_string()),
        }
    }
}

/// One row: an ordered mapping from column name to value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, see [`Record::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, replacing the value in place if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Look a field up by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Value at a column position.
    ///
    /// Records inside a [`Dataset`] are stored in dataset column order, so the
    /// position matches [`Dataset::column_index`].
    pub fn value_at(&self, index: usize) -> &Value {
        &self.fields[index].1
    }

    pub(crate) fn set_at(&mut self, index: usize, value: Value) {
        self.fields[index].1 = value;
    }

    /// Field names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reorder fields to `columns`. Returns `None` if the column sets differ.
    fn aligned_to(&self, columns: &[String]) -> Option<Record> {
        if self.fields.len() != columns.len() {
            return None;
        }
        let mut fields = Vec::with_capacity(columns.len());
        for name in columns {
            let value = self.get(name)?.clone();
            fields.push((name.clone(), value));
        }
        Some(Record { fields })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// An ordered sequence of records sharing one column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset from records.
    ///
    /// The first record fixes the column order; later records are reordered to
    /// match it. A record with a different column set is rejected.
    pub fn new(records: Vec<Record>) -> Result<Self> {
        let Some(first) = records.first() else {
            return Ok(Self::default());
        };
        let columns: Vec<String> = first.column_names().map(str::to_string).collect();

        let mut aligned = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let record = record
                .aligned_to(&columns)
                .ok_or_else(|| RefineryError::SchemaMismatch {
                    row,
                    expected: columns.clone(),
                    found: record.column_names().map(str::to_string).collect(),
                })?;
            aligned.push(record);
        }

        Ok(Self {
            columns,
            records: aligned,
        })
    }

    /// Build a dataset from a header and positional rows.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut records = Vec::with_capacity(rows.len());
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != columns.len() {
                return Err(RefineryError::SchemaMismatch {
                    row,
                    expected: columns.clone(),
                    found: columns.iter().take(values.len()).cloned().collect(),
                });
            }
            records.push(Record {
                fields: columns.iter().cloned().zip(values).collect(),
            });
        }
        Ok(Self { columns, records })
    }

    /// An empty dataset with a known header.
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    /// Wrap records already known to be aligned with `columns`.
    pub(crate) fn from_aligned(columns: Vec<String>, records: Vec<Record>) -> Self {
        debug_assert!(
            records
                .iter()
                .all(|r| r.column_names().eq(columns.iter().map(String::as_str)))
        );
        Self { columns, records }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of the column at `index`, in record order.
    pub fn column_at(&self, index: usize) -> Vec<&Value> {
        self.records.iter().map(|r| r.value_at(index)).collect()
    }

    /// All values of the named column, in record order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| RefineryError::ColumnNotFound(name.to_string()))?;
        Ok(self.column_at(index))
    }

    /// A new dataset with `extra` appended after the existing records.
    pub(crate) fn appended(&self, extra: Vec<Record>) -> Self {
        let mut records = Vec::with_capacity(self.records.len() + extra.len());
        records.extend(self.records.iter().cloned());
        records.extend(extra);
        Self::from_aligned(self.columns.clone(), records)
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_missing_rules() {
        assert!(Value::Missing.is_missing());
        assert!(Value::text("").is_missing());
        assert!(Value::text("   ").is_missing());
        assert!(Value::text("N/A").is_missing());
        assert!(Value::text("Undefined").is_missing());
        assert!(!Value::text("0").is_missing());
        assert!(!Value::Number(0.0).is_missing());
        assert!(Value::Number(f64::NAN).is_missing());
    }

    #[test]
    fn test_value_numeric_coercion() {
        assert_eq!(Value::text(" 2.5 ").as_number(), Some(2.5));
        assert_eq!(Value::Number(3.0).as_number(), Some(3.0));
        assert_eq!(Value::text("abc").as_number(), None);
        assert_eq!(Value::text("inf").as_number(), None);
        assert_eq!(Value::Missing.as_number(), None);
    }

    #[test]
    fn test_value_labels() {
        assert_eq!(Value::Number(25.0).to_label(), "25");
        assert_eq!(Value::Number(2.5).to_label(), "2.5");
        assert_eq!(Value::text("Male").to_label(), "Male");
        assert_eq!(Value::Missing.to_label(), "");
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![Value::Number(1.5), Value::text("x"), Value::Missing])
            .unwrap();
        assert_eq!(json, r#"[1.5,"x",null]"#);
    }

    #[test]
    fn test_record_insert_replaces_in_place() {
        let mut record = Record::new().with("a", "1").with("b", "2");
        record.insert("a", "3");
        let names: Vec<&str> = record.column_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::text("3")));
    }

    #[test]
    fn test_dataset_aligns_column_order_to_first_record() {
        let ds = Dataset::new(vec![
            Record::new().with("x", "1").with("y", "2"),
            Record::new().with("y", "4").with("x", "3"),
        ])
        .unwrap();

        assert_eq!(ds.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(ds.records()[1].value_at(0), &Value::text("3"));
    }

    #[test]
    fn test_dataset_rejects_mismatched_schema() {
        let result = Dataset::new(vec![
            Record::new().with("x", "1"),
            Record::new().with("z", "2"),
        ]);
        assert!(matches!(
            result,
            Err(RefineryError::SchemaMismatch { row: 1, .. })
        ));
    }

    #[test]
    fn test_dataset_serializes_with_key_order() {
        let ds = Dataset::new(vec![Record::new().with("b", "1").with("a", 2.0)]).unwrap();
        let json = serde_json::to_string(&ds).unwrap();
        assert_eq!(json, r#"[{"b":"1","a":2.0}]"#);
    }

    #[test]
    fn test_appended_keeps_originals() {
        let ds = Dataset::new(vec![Record::new().with("a", "1")]).unwrap();
        let bigger = ds.appended(vec![Record::new().with("a", "2")]);
        assert_eq!(ds.len(), 1);
        assert_eq!(bigger.len(), 2);
    }
}
