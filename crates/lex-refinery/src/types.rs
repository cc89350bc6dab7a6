use crate::dataset::Dataset;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Classification of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Severity of a report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A warning or error recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub severity: Severity,
}

impl ReportEntry {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Column name to inferred type, in dataset column order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnTypes(Vec<(String, ColumnType)>);

impl ColumnTypes {
    pub fn new(entries: Vec<(String, ColumnType)>) -> Self {
        Self(entries)
    }

    pub fn get(&self, column: &str) -> Option<ColumnType> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, t)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.0.iter().map(|(c, t)| (c.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ColumnTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, column_type) in &self.0 {
            map.serialize_entry(column, column_type)?;
        }
        map.end()
    }
}

/// Dataset-level statistics computed before and after a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_rows: usize,
    pub total_columns: usize,
    pub missing_values: usize,
    pub duplicate_rows: usize,
    pub column_types: ColumnTypes,
}

/// The `initial` / `final` statistics pair of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub initial: Stats,
    #[serde(rename = "final")]
    pub final_stats: Stats,
}

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
    Cancelled,
}

/// Everything a caller gets back from a run.
///
/// A run always produces a result; success is signalled by the absence of
/// high-severity entries in `errors`, see [`PipelineResult::is_success`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub original_data: Dataset,
    pub cleaned_data: Dataset,
    pub statistics: Statistics,
    pub warnings: Vec<ReportEntry>,
    pub errors: Vec<ReportEntry>,
    pub status: RunStatus,
    /// Target column used by the balancer, when balancing ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    pub duration_ms: u64,
}

impl PipelineResult {
    /// True when no high-severity error was recorded.
    pub fn is_success(&self) -> bool {
        !self.errors.iter().any(|e| e.severity == Severity::High)
    }

    /// Number of records added by the balancer.
    pub fn synthetic_rows(&self) -> usize {
        self.cleaned_data
            .len()
            .saturating_sub(self.original_data.len())
    }

    /// Look up the first warning of a given type.
    pub fn warning(&self, kind: &str) -> Option<&ReportEntry> {
        self.warnings.iter().find(|w| w.kind == kind)
    }

    /// A summary without the data payloads, for JSON reports.
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            status: self.status,
            success: self.is_success(),
            target_column: self.target_column.as_deref(),
            duration_ms: self.duration_ms,
            synthetic_rows: self.synthetic_rows(),
            statistics: &self.statistics,
            warnings: &self.warnings,
            errors: &self.errors,
        }
    }
}

/// Borrowed view of a [`PipelineResult`] without the datasets.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary<'a> {
    pub status: RunStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<&'a str>,
    pub duration_ms: u64,
    pub synthetic_rows: usize,
    pub statistics: &'a Statistics,
    pub warnings: &'a [ReportEntry],
    pub errors: &'a [ReportEntry],
}
