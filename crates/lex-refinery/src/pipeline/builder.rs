//! Main refinery pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating a run: text normalization, label normalization, imputation
//! and class balancing, in that order.

use crate::balancer::Balancer;
use crate::capabilities::{CapabilityRunner, LabelMatcher, TextCorrector, ZeroShotClassifier};
use crate::cleaner::{LabelNormalizer, TextNormalizer};
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{RefineryError, Result};
use crate::imputers::Imputer;
use crate::pipeline::StageContext;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate, RefineryStage,
};
use crate::pipeline::stage::{BalanceStage, PipelineState, Stage};
use crate::profiler::compute_stats;
use crate::reporting::{RunReport, codes};
use crate::types::{PipelineResult, ReportEntry, RunStatus, Severity, Statistics};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The main refinery pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
/// A pipeline can be run any number of times; every run gets its own report.
///
/// # Example
///
/// ```rust,ignore
/// use lex_refinery::{CancellationToken, Pipeline, PipelineConfig};
///
/// let token = CancellationToken::new();
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().balance_classes(true).seed(7).build()?)
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run(&dataset);
///
/// assert!(result.is_success());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    text_corrector: Option<Arc<dyn TextCorrector>>,
    label_matcher: Option<Arc<dyn LabelMatcher>>,
    zero_shot_classifier: Option<Arc<dyn ZeroShotClassifier>>,
    runner: Option<Arc<CapabilityRunner>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    state: Mutex<PipelineState>,
}

// Pipelines are built on one thread and run on a worker
static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// State of the current (or last) run.
    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Run every enabled stage over `dataset`.
    ///
    /// Never fails: stage errors end the run with [`RunStatus::Failed`] and a
    /// high-severity `STAGE_FAILED` entry, cancellation ends it with
    /// [`RunStatus::Cancelled`]. Either way the result carries the data as
    /// far as it got.
    pub fn run(&self, dataset: &Dataset) -> PipelineResult {
        let stages = self.stages();
        self.run_stages(dataset, &stages)
    }

    /// The enabled stages, in execution order.
    fn stages(&self) -> Vec<Box<dyn Stage>> {
        let mut stages: Vec<Box<dyn Stage>> = Vec::new();

        if self.config.fix_typos {
            let mut normalizer =
                TextNormalizer::new().trigger_ratio(self.config.enrichment_trigger_ratio);
            if let (Some(corrector), Some(runner)) = (&self.text_corrector, &self.runner) {
                normalizer = normalizer.with_corrector(corrector.clone(), runner.clone());
            }
            stages.push(Box::new(normalizer));
        } else {
            info!("Skipping text normalization (disabled)");
        }

        if self.config.normalize_labels {
            let mut normalizer = LabelNormalizer::new();
            if let (Some(matcher), Some(runner)) = (&self.label_matcher, &self.runner) {
                normalizer = normalizer.with_matcher(matcher.clone(), runner.clone());
            }
            if let (Some(classifier), Some(runner)) = (&self.zero_shot_classifier, &self.runner) {
                normalizer = normalizer.with_classifier(classifier.clone(), runner.clone());
            }
            stages.push(Box::new(normalizer));
        } else {
            info!("Skipping label normalization (disabled)");
        }

        if self.config.fill_missing {
            stages.push(Box::new(Imputer::new()));
        } else {
            info!("Skipping imputation (disabled)");
        }

        if self.config.balance_classes {
            stages.push(Box::new(BalanceStage::new(
                Balancer::new(self.config.minority_ratio, self.config.target_ratio),
                self.config.target_column.clone(),
                self.config.seed,
            )));
        } else {
            info!("Skipping class balancing (disabled)");
        }

        stages
    }

    pub(crate) fn run_stages(&self, dataset: &Dataset, stages: &[Box<dyn Stage>]) -> PipelineResult {
        let start_time = Instant::now();
        let report = RunReport::new();

        info!(
            "Starting refinery pipeline on {} records x {} columns ({} stages)",
            dataset.len(),
            dataset.width(),
            stages.len()
        );
        self.set_state(PipelineState::Idle);
        self.report_progress(ProgressUpdate::new(
            RefineryStage::Initializing,
            0.0,
            "Starting refinery pipeline...",
        ));

        self.report_progress(ProgressUpdate::new(
            RefineryStage::Profiling,
            0.0,
            "Computing initial statistics...",
        ));
        let initial = compute_stats(dataset);
        if dataset.is_empty() {
            let input_error = RefineryError::EmptyDataset;
            warn!("{}; nothing to refine", input_error);
            report.warn(codes::EMPTY_DATASET, input_error.to_string(), Severity::Medium);
        }
        debug!(
            "Initial statistics: {} missing, {} duplicate rows",
            initial.missing_values, initial.duplicate_rows
        );

        let mut current = dataset.clone();
        let mut outcome = PipelineState::Done;

        for stage in stages {
            match self.run_stage(stage.as_ref(), &current, &report) {
                Ok(next) => current = next,
                Err(e) if e.is_cancelled() => {
                    warn!("Pipeline cancelled during {}", stage.name());
                    report.warn(
                        codes::PIPELINE_CANCELLED,
                        format!(
                            "Run cancelled during {}; returning partial results",
                            stage.name()
                        ),
                        Severity::Low,
                    );
                    outcome = PipelineState::Cancelled;
                    break;
                }
                Err(e) => {
                    let failure = RefineryError::StageFailed {
                        stage: stage.name().to_string(),
                        reason: e.to_string(),
                    };
                    error!("Pipeline error: {}", failure);
                    report.error(codes::STAGE_FAILED, failure.to_string(), Severity::High);
                    outcome = PipelineState::Failed;
                    break;
                }
            }
        }

        self.report_progress(ProgressUpdate::new(
            RefineryStage::Statistics,
            0.0,
            "Computing final statistics...",
        ));
        let final_stats = compute_stats(&current);
        self.set_state(outcome);

        match outcome {
            PipelineState::Cancelled => self.report_progress(ProgressUpdate::cancelled()),
            PipelineState::Failed => {
                self.report_progress(ProgressUpdate::failed("Pipeline failed; partial results returned"))
            }
            _ => self.report_progress(ProgressUpdate::complete("Pipeline completed successfully")),
        }

        let (warnings, errors, target_column) = report.into_parts();
        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Pipeline finished as {:?} in {} ms: {} -> {} records, {} warnings, {} errors",
            outcome,
            duration_ms,
            dataset.len(),
            current.len(),
            warnings.len(),
            errors.len()
        );

        PipelineResult {
            original_data: dataset.clone(),
            cleaned_data: current,
            statistics: Statistics {
                initial,
                final_stats,
            },
            warnings,
            errors,
            status: outcome.run_status(),
            target_column,
            duration_ms,
        }
    }

    fn run_stage(&self, stage: &dyn Stage, dataset: &Dataset, report: &RunReport) -> Result<Dataset> {
        self.cancellation_token.check()?;

        let progress_stage = stage.progress_stage();
        self.set_state(stage.state());
        info!("Running stage: {}", stage.name());
        self.report_progress(ProgressUpdate::new(
            progress_stage,
            0.0,
            format!("{}...", progress_stage.display_name()),
        ));

        let mut ctx = StageContext::new(report, &self.cancellation_token);
        if let Some(reporter) = &self.progress_reporter {
            ctx = ctx.with_progress(reporter.as_ref(), progress_stage);
        }
        let next = stage.apply(dataset, &ctx)?;

        self.report_progress(ProgressUpdate::new(
            progress_stage,
            1.0,
            format!("{} complete", progress_stage.display_name()),
        ));
        Ok(next)
    }

    fn set_state(&self, state: PipelineState) {
        debug!("Pipeline state: {:?}", state);
        *self.state.lock() = state;
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Run the pipeline once with `config` and no enrichment capabilities.
///
/// An invalid configuration does not panic: the result comes back
/// [`RunStatus::Failed`] with the input untouched and an `INVALID_CONFIG`
/// error entry.
pub fn refine(dataset: &Dataset, config: PipelineConfig) -> PipelineResult {
    match Pipeline::builder().config(config).build() {
        Ok(pipeline) => pipeline.run(dataset),
        Err(e) => {
            error!("Pipeline configuration rejected: {}", e);
            let stats = compute_stats(dataset);
            PipelineResult {
                original_data: dataset.clone(),
                cleaned_data: dataset.clone(),
                statistics: Statistics {
                    initial: stats.clone(),
                    final_stats: stats,
                },
                warnings: Vec::new(),
                errors: vec![ReportEntry::new(e.error_code(), e.to_string(), Severity::High)],
                status: RunStatus::Failed,
                target_column: None,
                duration_ms: 0,
            }
        }
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
///
/// # Example
///
/// ```rust,ignore
/// use lex_refinery::capabilities::OpenRouterProvider;
/// use lex_refinery::Pipeline;
/// use std::sync::Arc;
///
/// let provider = Arc::new(OpenRouterProvider::new(api_key)?);
///
/// let pipeline = Pipeline::builder()
///     .capabilities(provider)
///     .on_progress(|update| println!("{}", update.message))
///     .build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    text_corrector: Option<Arc<dyn TextCorrector>>,
    label_matcher: Option<Arc<dyn LabelMatcher>>,
    zero_shot_classifier: Option<Arc<dyn ZeroShotClassifier>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the free-text correction capability.
    pub fn text_corrector(mut self, corrector: Arc<dyn TextCorrector>) -> Self {
        self.text_corrector = Some(corrector);
        self
    }

    /// Set the label-matching capability.
    pub fn label_matcher(mut self, matcher: Arc<dyn LabelMatcher>) -> Self {
        self.label_matcher = Some(matcher);
        self
    }

    /// Set the zero-shot classification capability.
    pub fn zero_shot_classifier(mut self, classifier: Arc<dyn ZeroShotClassifier>) -> Self {
        self.zero_shot_classifier = Some(classifier);
        self
    }

    /// Use one provider for all three capabilities.
    pub fn capabilities<P>(self, provider: Arc<P>) -> Self
    where
        P: TextCorrector + LabelMatcher + ZeroShotClassifier + 'static,
    {
        self.text_corrector(provider.clone())
            .label_matcher(provider.clone())
            .zero_shot_classifier(provider)
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline.
    ///
    /// Clone the token and call [`CancellationToken::cancel()`] from any
    /// thread. The run stops at the next stage or column boundary and returns
    /// what it has with [`RunStatus::Cancelled`].
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// The capability runner is only started when at least one capability
    /// was given.
    ///
    /// # Errors
    ///
    /// [`RefineryError::InvalidConfig`] if the configuration does not
    /// validate, [`RefineryError::Capability`] if the runner cannot start.
    pub fn build(self) -> std::result::Result<Pipeline, RefineryError> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| RefineryError::InvalidConfig(e.to_string()))?;

        let wants_runner = self.text_corrector.is_some()
            || self.label_matcher.is_some()
            || self.zero_shot_classifier.is_some();
        let runner = if wants_runner {
            Some(Arc::new(CapabilityRunner::new(config.capability_policy())?))
        } else {
            None
        };

        Ok(Pipeline {
            config,
            text_corrector: self.text_corrector,
            label_matcher: self.label_matcher,
            zero_shot_classifier: self.zero_shot_classifier,
            runner,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
            state: Mutex::new(PipelineState::Idle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Record, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> Dataset {
        Dataset::new(vec![
            Record::new().with("name", "Alice").with("age", "25").with("category", "MALE"),
            Record::new().with("name", "Bob").with("age", Value::Missing).with("category", "female"),
        ])
        .unwrap()
    }

    struct FailingStage;

    impl Stage for FailingStage {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn state(&self) -> PipelineState {
            PipelineState::Imputing
        }

        fn progress_stage(&self) -> RefineryStage {
            RefineryStage::Imputation
        }

        fn apply(&self, _dataset: &Dataset, _ctx: &StageContext<'_>) -> Result<Dataset> {
            Err(RefineryError::Internal("boom".to_string()))
        }
    }

    /// Cancels its own run from inside the stage.
    struct CancellingStage(CancellationToken);

    impl Stage for CancellingStage {
        fn name(&self) -> &'static str {
            "cancelling"
        }

        fn state(&self) -> PipelineState {
            PipelineState::Normalizing
        }

        fn progress_stage(&self) -> RefineryStage {
            RefineryStage::TextNormalization
        }

        fn apply(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<Dataset> {
            self.0.cancel();
            ctx.check_cancelled()?;
            Ok(dataset.clone())
        }
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert!(pipeline.runner.is_none());
        assert!(pipeline.config.fix_typos);
        assert!(!pipeline.config.balance_classes);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let config = PipelineConfig {
            minority_ratio: 0.0,
            ..Default::default()
        };
        let err = Pipeline::builder().config(config).build().err().unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_stage_selection_follows_config() {
        let config = PipelineConfig::builder()
            .fix_typos(false)
            .balance_classes(true)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();

        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["label_normalization", "imputation", "class_balancing"]);
    }

    #[test]
    fn test_run_done() {
        let pipeline = Pipeline::builder().build().unwrap();

        let result = pipeline.run(&sample());

        assert_eq!(result.status, RunStatus::Done);
        assert!(result.is_success());
        assert_eq!(result.statistics.initial.missing_values, 1);
        assert_eq!(result.statistics.final_stats.missing_values, 0);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn test_failing_stage_keeps_partial_data() {
        let pipeline = Pipeline::builder().build().unwrap();
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(TextNormalizer::new()), Box::new(FailingStage)];

        let result = pipeline.run_stages(&sample(), &stages);

        assert_eq!(result.status, RunStatus::Failed);
        assert!(!result.is_success());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, codes::STAGE_FAILED);
        assert_eq!(result.errors[0].severity, Severity::High);
        assert!(result.errors[0].message.contains("exploding"));
        // Text normalization ran before the failure
        assert_eq!(
            result.cleaned_data.records()[0].get("category"),
            Some(&Value::text("Male"))
        );
        // Imputation did not
        assert_eq!(result.statistics.final_stats.missing_values, 1);
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_cancellation_mid_run() {
        let token = CancellationToken::new();
        let pipeline = Pipeline::builder()
            .cancellation_token(token.clone())
            .build()
            .unwrap();
        let stages: Vec<Box<dyn Stage>> =
            vec![Box::new(CancellingStage(token)), Box::new(Imputer::new())];

        let result = pipeline.run_stages(&sample(), &stages);

        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(result.is_success());
        assert!(result.warning(codes::PIPELINE_CANCELLED).is_some());
        assert_eq!(result.cleaned_data, sample());
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let pipeline = Pipeline::builder()
            .cancellation_token(token)
            .build()
            .unwrap();

        let result = pipeline.run(&sample());

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.cleaned_data, result.original_data);
    }

    #[test]
    fn test_progress_reaches_completion() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let last = Arc::new(Mutex::new(None));
        let last_clone = last.clone();

        let pipeline = Pipeline::builder()
            .on_progress(move |update| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
                *last_clone.lock() = Some(update.stage);
            })
            .build()
            .unwrap();

        pipeline.run(&sample());

        assert!(call_count.load(Ordering::SeqCst) > 5);
        assert_eq!(*last.lock(), Some(RefineryStage::Complete));
    }

    #[test]
    fn test_refine_with_invalid_config() {
        let config = PipelineConfig {
            capability_max_concurrency: 0,
            ..Default::default()
        };

        let result = refine(&sample(), config);

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.errors[0].kind, "INVALID_CONFIG");
        assert_eq!(result.cleaned_data, sample());
    }
}
