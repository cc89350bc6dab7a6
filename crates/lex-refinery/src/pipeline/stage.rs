//! The stages a pipeline run is made of.
//!
//! Each stage is a pure transformation `&Dataset -> Dataset` that may append
//! to the run report. The orchestrator only sees them through [`Stage`].

use crate::balancer::Balancer;
use crate::cleaner::{LabelNormalizer, TextNormalizer};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::imputers::Imputer;
use crate::pipeline::StageContext;
use crate::pipeline::progress::RefineryStage;
use crate::profiler::detect_target_column;
use crate::reporting::codes;
use crate::types::{RunStatus, Severity};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Normalizing,
    Imputing,
    Balancing,
    Done,
    Failed,
    Cancelled,
}

impl PipelineState {
    /// True once the run has ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// The status reported for a run that ended in this state.
    pub fn run_status(&self) -> RunStatus {
        match self {
            Self::Failed => RunStatus::Failed,
            Self::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Done,
        }
    }
}

/// One step of the pipeline.
pub trait Stage: Send + Sync {
    /// Short name used in logs and `STAGE_FAILED` messages.
    fn name(&self) -> &'static str;

    /// State the pipeline is in while this stage runs.
    fn state(&self) -> PipelineState;

    /// Stage reported to progress listeners.
    fn progress_stage(&self) -> RefineryStage;

    /// Transform `dataset` into a new dataset.
    ///
    /// # Errors
    ///
    /// Any error ends the run. [`RefineryError::Cancelled`](crate::RefineryError::Cancelled)
    /// ends it as cancelled, everything else as failed.
    fn apply(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<Dataset>;
}

impl Stage for TextNormalizer {
    fn name(&self) -> &'static str {
        "text_normalization"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Normalizing
    }

    fn progress_stage(&self) -> RefineryStage {
        RefineryStage::TextNormalization
    }

    fn apply(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<Dataset> {
        self.normalize(dataset, ctx).map(|(dataset, _)| dataset)
    }
}

impl Stage for LabelNormalizer {
    fn name(&self) -> &'static str {
        "label_normalization"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Normalizing
    }

    fn progress_stage(&self) -> RefineryStage {
        RefineryStage::LabelNormalization
    }

    fn apply(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<Dataset> {
        self.normalize(dataset, ctx).map(|(dataset, _)| dataset)
    }
}

impl Stage for Imputer {
    fn name(&self) -> &'static str {
        "imputation"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Imputing
    }

    fn progress_stage(&self) -> RefineryStage {
        RefineryStage::Imputation
    }

    fn apply(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<Dataset> {
        self.impute(dataset, ctx).map(|(dataset, _)| dataset)
    }
}

/// Balancing with target resolution and a seeded random source.
///
/// The target is the configured column, or else whatever
/// [`detect_target_column`] finds on the stage's input.
#[derive(Debug, Clone)]
pub struct BalanceStage {
    balancer: Balancer,
    target_column: Option<String>,
    seed: Option<u64>,
}

impl BalanceStage {
    pub fn new(balancer: Balancer, target_column: Option<String>, seed: Option<u64>) -> Self {
        Self {
            balancer,
            target_column,
            seed,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Stage for BalanceStage {
    fn name(&self) -> &'static str {
        "class_balancing"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Balancing
    }

    fn progress_stage(&self) -> RefineryStage {
        RefineryStage::Balancing
    }

    fn apply(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<Dataset> {
        let target = self
            .target_column
            .clone()
            .or_else(|| detect_target_column(dataset));

        let Some(target) = target else {
            warn!("No target column configured or detected, skipping balancing");
            ctx.warn(
                codes::CLASS_BALANCE_SKIPPED,
                "No target column configured or detected; skipping class balancing",
                Severity::Medium,
            );
            return Ok(dataset.clone());
        };

        if dataset.column_index(&target).is_some() {
            info!("Balancing on target column '{}'", target);
            ctx.report().set_target_column(target.as_str());
        }

        let mut rng = self.rng();
        self.balancer
            .balance(dataset, &target, &mut rng, ctx)
            .map(|(dataset, _)| dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use crate::pipeline::CancellationToken;
    use crate::reporting::RunReport;

    fn dataset() -> Dataset {
        let mut records = Vec::new();
        for i in 0..12 {
            let outcome = if i < 10 { "approved" } else { "denied" };
            records.push(
                Record::new()
                    .with("amount", (i * 100) as f64)
                    .with("outcome", outcome),
            );
        }
        Dataset::new(records).unwrap()
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Balancing.is_terminal());
        assert!(PipelineState::Done.is_terminal());
        assert_eq!(PipelineState::Cancelled.run_status(), RunStatus::Cancelled);
        assert_eq!(PipelineState::Failed.run_status(), RunStatus::Failed);
        assert_eq!(PipelineState::Done.run_status(), RunStatus::Done);
    }

    #[test]
    fn test_balance_stage_detects_target() {
        let report = RunReport::new();
        let token = CancellationToken::new();
        let stage = BalanceStage::new(Balancer::default(), None, Some(3));

        let out = stage
            .apply(&dataset(), &StageContext::new(&report, &token))
            .unwrap();

        assert_eq!(out.len(), 12 + 6);
        let (_, _, target) = report.into_parts();
        assert_eq!(target.as_deref(), Some("outcome"));
    }

    #[test]
    fn test_balance_stage_without_target_skips() {
        let ds = Dataset::new(vec![
            Record::new().with("a", "one").with("b", "1"),
            Record::new().with("a", "two").with("b", "2"),
        ])
        .unwrap();
        let report = RunReport::new();
        let token = CancellationToken::new();
        let stage = BalanceStage::new(Balancer::default(), None, None);

        let out = stage.apply(&ds, &StageContext::new(&report, &token)).unwrap();

        assert_eq!(out, ds);
        let (warnings, _, target) = report.into_parts();
        assert_eq!(warnings[0].kind, codes::CLASS_BALANCE_SKIPPED);
        assert_eq!(warnings[0].severity, Severity::Medium);
        assert!(target.is_none());
    }

    #[test]
    fn test_unknown_configured_target_is_not_recorded() {
        let report = RunReport::new();
        let token = CancellationToken::new();
        let stage = BalanceStage::new(Balancer::default(), Some("missing".to_string()), Some(1));

        let out = stage
            .apply(&dataset(), &StageContext::new(&report, &token))
            .unwrap();

        assert_eq!(out.len(), 12);
        let (warnings, _, target) = report.into_parts();
        assert_eq!(warnings[0].kind, codes::CLASS_BALANCE_SKIPPED);
        assert!(target.is_none());
    }
}
