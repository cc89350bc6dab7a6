//! Append-only warning/error log of a single run.

use crate::types::{ReportEntry, Severity};
use parking_lot::Mutex;
use tracing::debug;

/// Warning and error types emitted by the pipeline.
pub mod codes {
    pub const TYPO_CORRECTION_COMPLETE: &str = "TYPO_CORRECTION_COMPLETE";
    pub const TYPO_ENRICHMENT_FAILED: &str = "TYPO_ENRICHMENT_FAILED";
    pub const LABEL_NORMALIZATION_COMPLETE: &str = "LABEL_NORMALIZATION_COMPLETE";
    pub const LABEL_ENRICHMENT_FAILED: &str = "LABEL_ENRICHMENT_FAILED";
    pub const MISSING_VALUE_COMPLETE: &str = "MISSING_VALUE_COMPLETE";
    pub const IMPUTATION_COLUMN_FAILED: &str = "IMPUTATION_COLUMN_FAILED";
    pub const CLASS_BALANCE_COMPLETE: &str = "CLASS_BALANCE_COMPLETE";
    pub const CLASS_BALANCE_INFO: &str = "CLASS_BALANCE_INFO";
    pub const CLASS_BALANCE_SKIPPED: &str = "CLASS_BALANCE_SKIPPED";
    pub const STAGE_FAILED: &str = "STAGE_FAILED";
    pub const PIPELINE_CANCELLED: &str = "PIPELINE_CANCELLED";
    pub const EMPTY_DATASET: &str = "EMPTY_DATASET";
}

#[derive(Debug, Default)]
struct Entries {
    warnings: Vec<ReportEntry>,
    errors: Vec<ReportEntry>,
    target_column: Option<String>,
}

/// Run-level diagnostics.
///
/// Created once per run and shared by reference with every stage. Appends
/// take a lock, so entries pushed from parallel sub-tasks are never lost.
/// Entries can only be added; [`RunReport::into_parts`] hands them out when
/// the run is over.
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Mutex<Entries>,
}

static_assertions::assert_impl_all!(RunReport: Send, Sync);

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a warning.
    pub fn warn(&self, kind: &str, message: impl Into<String>, severity: Severity) {
        self.push_warning(ReportEntry::new(kind, message, severity));
    }

    /// Append an error.
    pub fn error(&self, kind: &str, message: impl Into<String>, severity: Severity) {
        self.push_error(ReportEntry::new(kind, message, severity));
    }

    pub fn push_warning(&self, entry: ReportEntry) {
        debug!("[{}] {}", entry.kind, entry.message);
        self.entries.lock().warnings.push(entry);
    }

    pub fn push_error(&self, entry: ReportEntry) {
        debug!("[{}] {}", entry.kind, entry.message);
        self.entries.lock().errors.push(entry);
    }

    /// Record the class-label column used by the balancer.
    pub fn set_target_column(&self, column: impl Into<String>) {
        self.entries.lock().target_column = Some(column.into());
    }

    /// Snapshot of the warnings recorded so far.
    pub fn warnings(&self) -> Vec<ReportEntry> {
        self.entries.lock().warnings.clone()
    }

    /// Snapshot of the errors recorded so far.
    pub fn errors(&self) -> Vec<ReportEntry> {
        self.entries.lock().errors.clone()
    }

    pub fn has_high_severity_errors(&self) -> bool {
        self.entries
            .lock()
            .errors
            .iter()
            .any(|e| e.severity == Severity::High)
    }

    /// Consume the report: `(warnings, errors, target_column)`.
    pub fn into_parts(self) -> (Vec<ReportEntry>, Vec<ReportEntry>, Option<String>) {
        let entries = self.entries.into_inner();
        (entries.warnings, entries.errors, entries.target_column)
    }
}
