//! Per-run context handed to every stage.

use crate::error::Result;
use crate::pipeline::progress::{CancellationToken, ProgressReporter, ProgressUpdate, RefineryStage};
use crate::reporting::RunReport;
use crate::types::Severity;

/// What a stage may touch besides its input dataset: the run report, the
/// cancellation token and (optionally) a progress listener.
///
/// # Example
///
/// ```rust,ignore
/// let report = RunReport::new();
/// let token = CancellationToken::new();
/// let ctx = StageContext::new(&report, &token);
/// let (imputed, filled) = Imputer::new().impute(&dataset, &ctx)?;
/// ```
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    report: &'a RunReport,
    cancellation: &'a CancellationToken,
    progress: Option<(&'a dyn ProgressReporter, RefineryStage)>,
}

impl<'a> StageContext<'a> {
    pub fn new(report: &'a RunReport, cancellation: &'a CancellationToken) -> Self {
        Self {
            report,
            cancellation,
            progress: None,
        }
    }

    /// Attach a progress listener; per-column updates are tagged with `stage`.
    pub fn with_progress(mut self, reporter: &'a dyn ProgressReporter, stage: RefineryStage) -> Self {
        self.progress = Some((reporter, stage));
        self
    }

    pub fn report(&self) -> &'a RunReport {
        self.report
    }

    /// Shorthand for [`RunReport::warn`].
    pub fn warn(&self, kind: &str, message: impl Into<String>, severity: Severity) {
        self.report.warn(kind, message, severity);
    }

    /// `Err(RefineryError::Cancelled)` once the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancellation.check()
    }

    /// Report that `column` (the `index`-th of `total`) is being processed.
    pub fn column_progress(&self, column: &str, index: usize, total: usize) {
        if let Some((reporter, stage)) = self.progress {
            reporter.report(ProgressUpdate::with_items(
                stage,
                format!("Column: {}", column),
                index,
                total,
                format!("{}: {}", stage.display_name(), column),
            ));
        }
    }
}
