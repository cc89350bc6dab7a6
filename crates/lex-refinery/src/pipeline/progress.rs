//! Progress reporting and cancellation support for the refinery pipeline.
//!
//! Listeners receive a [`ProgressUpdate`] at every stage boundary and once per
//! column inside a stage. A [`CancellationToken`] can be flipped from any
//! thread; the run notices it at the next column.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_refinery::{Pipeline, CancellationToken};
//!
//! let stop = CancellationToken::new();
//! let watchdog = stop.clone();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(30));
//!     watchdog.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(stop)
//!     .on_progress(|u| eprintln!("{:>5.1}% {}", u.progress * 100.0, u.message))
//!     .build()?
//!     .run(&dataset);
//! ```

use crate::error::{RefineryError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of the refinery pipeline, as seen by progress listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineryStage {
    /// Pipeline is initializing
    Initializing,
    /// Computing initial statistics
    Profiling,
    /// Dictionary, whitespace, punctuation and camel-case repairs
    TextNormalization,
    /// Clustering categorical label variants
    LabelNormalization,
    /// Filling missing values
    Imputation,
    /// Generating synthetic minority-class records
    Balancing,
    /// Computing final statistics
    Statistics,
    /// Run finished
    Complete,
    /// Run stopped through its token
    Cancelled,
    /// A stage returned an error
    Failed,
}

impl RefineryStage {
    /// Label shown to users.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Profiling => "Profiling Dataset",
            Self::TextNormalization => "Normalizing Text",
            Self::LabelNormalization => "Normalizing Labels",
            Self::Imputation => "Imputing Values",
            Self::Balancing => "Balancing Classes",
            Self::Statistics => "Computing Statistics",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run this stage accounts for.
    ///
    /// The weights of the processing stages sum to 1.0; terminal states weigh 0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Profiling => 0.08,
            Self::TextNormalization => 0.30,
            Self::LabelNormalization => 0.20,
            Self::Imputation => 0.20,
            Self::Balancing => 0.15,
            Self::Statistics => 0.05,
            Self::Complete => 0.0,
            Self::Cancelled => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Overall progress when this stage starts.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Profiling => 0.02,
            Self::TextNormalization => 0.10,
            Self::LabelNormalization => 0.40,
            Self::Imputation => 0.60,
            Self::Balancing => 0.80,
            Self::Statistics => 0.95,
            Self::Complete => 1.0,
            Self::Cancelled => 0.0,
            Self::Failed => 0.0,
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Stage the event belongs to
    pub stage: RefineryStage,

    /// Optional sub-stage description (e.g., "Column: email")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Whole-run progress in [0, 1]
    pub progress: f32,

    /// Progress inside `stage`, in [0, 1]
    pub stage_progress: f32,

    /// What is happening, for humans
    pub message: String,

    /// Number of items processed in current stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Total items in current stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Stage-level update.
    pub fn new(stage: RefineryStage, stage_progress: f32, message: impl Into<String>) -> Self {
        Self::build(stage, None, stage_progress, message, None)
    }

    /// Per-item update; `stage_progress` is `current / total`.
    pub fn with_items(
        stage: RefineryStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self::build(
            stage,
            Some(sub_stage.into()),
            stage_progress,
            message,
            Some((current, total)),
        )
    }

    fn build(
        stage: RefineryStage,
        sub_stage: Option<String>,
        stage_progress: f32,
        message: impl Into<String>,
        items: Option<(usize, usize)>,
    ) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: items.map(|(current, _)| current),
            items_total: items.map(|(_, total)| total),
        }
    }

    /// Final update of a finished run.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            progress: 1.0,
            stage_progress: 1.0,
            ..Self::new(RefineryStage::Complete, 1.0, message)
        }
    }

    /// Final update of a cancelled run.
    pub fn cancelled() -> Self {
        Self::new(RefineryStage::Cancelled, 0.0, "Pipeline cancelled by user")
    }

    /// Final update of a failed run.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(RefineryStage::Failed, 0.0, message)
    }
}

/// Trait for receiving progress updates during a run.
///
/// Implementations must be `Send + Sync`; the pipeline may run on a
/// background thread while the listener lives elsewhere.
pub trait ProgressReporter: Send + Sync {
    /// Called when progress is made.
    ///
    /// May be called once per column inside a stage, so implementations
    /// should be cheap and non-blocking.
    fn report(&self, update: ProgressUpdate);
}

/// Adapts a closure into a [`ProgressReporter`].
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Shared stop flag for a run.
///
/// Cheap to clone; all clones share one flag. The pipeline checks it between
/// stages and between columns inside a stage, and finishes the run with
/// [`RunStatus::Cancelled`](crate::types::RunStatus::Cancelled).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(RefineryError::Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RefineryError::Cancelled);
        }
        Ok(())
    }

    /// Reset the token for reuse in another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_fresh_token_passes_check() {
        let token = CancellationToken::default();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_is_seen_by_every_clone() {
        let token = CancellationToken::new();
        let observers: Vec<CancellationToken> = (0..3).map(|_| token.clone()).collect();

        observers[1].cancel();

        assert!(token.is_cancelled());
        for observer in &observers {
            assert!(matches!(observer.check(), Err(RefineryError::Cancelled)));
        }
    }

    #[test]
    fn test_reset_allows_reuse() {
        let token = CancellationToken::new();
        token.cancel();
        token.reset();
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_column_update_maps_into_stage_window() {
        let update = ProgressUpdate::with_items(
            RefineryStage::Imputation,
            "Column: age",
            5,
            10,
            "Imputing column age",
        );
        assert_eq!(update.sub_stage.as_deref(), Some("Column: age"));
        assert_eq!((update.items_processed, update.items_total), (Some(5), Some(10)));
        // 0.60 + 0.20 * 0.5
        assert!((update.progress - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_zero_total_does_not_divide() {
        let update = ProgressUpdate::with_items(RefineryStage::Balancing, "Column: x", 0, 0, "");
        assert_eq!(update.stage_progress, 0.0);
        assert!((update.progress - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_terminal_updates() {
        let done = ProgressUpdate::complete("all good");
        assert_eq!(done.stage, RefineryStage::Complete);
        assert_eq!((done.progress, done.stage_progress), (1.0, 1.0));

        assert_eq!(ProgressUpdate::cancelled().stage, RefineryStage::Cancelled);
        assert_eq!(ProgressUpdate::failed("boom").message, "boom");
    }

    #[test]
    fn test_closure_reporter_forwards_updates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ClosureProgressReporter::new(move |update: ProgressUpdate| {
            sink.lock().push(update.stage);
        });

        reporter.report(ProgressUpdate::new(RefineryStage::Profiling, 0.5, "profiling"));
        reporter.report(ProgressUpdate::complete("done"));

        assert_eq!(
            *seen.lock(),
            vec![RefineryStage::Profiling, RefineryStage::Complete]
        );
    }

    #[test]
    fn test_stage_windows_are_contiguous() {
        let stages = [
            RefineryStage::Initializing,
            RefineryStage::Profiling,
            RefineryStage::TextNormalization,
            RefineryStage::LabelNormalization,
            RefineryStage::Imputation,
            RefineryStage::Balancing,
            RefineryStage::Statistics,
        ];

        let total: f32 = stages.iter().map(RefineryStage::weight).sum();
        assert!((total - 1.0).abs() < 1e-6);

        for pair in stages.windows(2) {
            let end = pair[0].base_progress() + pair[0].weight();
            assert!((end - pair[1].base_progress()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&RefineryStage::TextNormalization).unwrap();
        assert_eq!(json, "\"text_normalization\"");
        let json = serde_json::to_string(&RefineryStage::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn test_cancel_from_worker_thread() {
        let token = CancellationToken::new();
        let worker_token = token.clone();

        std::thread::spawn(move || worker_token.cancel())
            .join()
            .unwrap();

        assert!(token.is_cancelled());
    }
}
