//! Class balancing module.
//!
//! This module provides:
//! - Class distribution over a target column (first-seen order)
//! - A balancing plan: how many records each minority class needs
//! - Synthetic record generation per class (normal draws for numbers,
//!   observed draws for categories, vocabulary mixing for free text)
//!
//! The balancer only ever appends records; existing rows are kept as they
//! are and the dataset never shrinks.

mod synthetic;

pub use synthetic::{ClassSampler, standard_normal};

use crate::config::{DEFAULT_MINORITY_RATIO, DEFAULT_TARGET_RATIO};
use crate::dataset::{Dataset, Record, Value};
use crate::error::Result;
use crate::pipeline::StageContext;
use crate::reporting::codes;
use crate::types::Severity;
use crate::utils::ordered_counts;
use rand::Rng;
use tracing::{debug, info};

/// Count records per stringified target value, in first-seen order.
///
/// Missing values are not a class and are ignored.
pub fn class_distribution(values: &[&Value]) -> Vec<(String, usize)> {
    ordered_counts(
        values
            .iter()
            .filter(|v| !v.is_missing())
            .map(|v| v.to_label()),
    )
}

/// Tops up minority classes with synthetic records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balancer {
    minority_ratio: f64,
    target_ratio: f64,
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new(DEFAULT_MINORITY_RATIO, DEFAULT_TARGET_RATIO)
    }
}

impl Balancer {
    /// `minority_ratio`: a class below this share of the largest class is a
    /// minority. `target_ratio`: minorities are filled up to this share.
    pub fn new(minority_ratio: f64, target_ratio: f64) -> Self {
        Self {
            minority_ratio,
            target_ratio,
        }
    }

    /// Records to generate per minority class, in distribution order.
    ///
    /// Classes that need nothing are left out, so an empty plan means the
    /// target is already balanced.
    pub fn plan(&self, distribution: &[(String, usize)]) -> Vec<(String, usize)> {
        let Some(max_size) = distribution.iter().map(|(_, count)| *count).max() else {
            return Vec::new();
        };
        let threshold = self.minority_ratio * max_size as f64;
        let goal = (self.target_ratio * max_size as f64).floor() as usize;

        distribution
            .iter()
            .filter(|(_, count)| (*count as f64) < threshold)
            .filter_map(|(label, count)| {
                let needed = goal.saturating_sub(*count);
                (needed > 0).then(|| (label.clone(), needed))
            })
            .collect()
    }

    /// Balance `dataset` on `target`; returns the new dataset and the number
    /// of synthetic records appended.
    ///
    /// An unknown or empty target column is not an error: the dataset comes
    /// back unchanged with a `CLASS_BALANCE_SKIPPED` warning.
    pub fn balance<R: Rng + ?Sized>(
        &self,
        dataset: &Dataset,
        target: &str,
        rng: &mut R,
        ctx: &StageContext<'_>,
    ) -> Result<(Dataset, usize)> {
        let Some(target_index) = dataset.column_index(target) else {
            ctx.warn(
                codes::CLASS_BALANCE_SKIPPED,
                format!("Target column '{}' not found; skipping class balancing", target),
                Severity::Medium,
            );
            return Ok((dataset.clone(), 0));
        };

        let distribution = class_distribution(&dataset.column_at(target_index));
        if distribution.is_empty() {
            ctx.warn(
                codes::CLASS_BALANCE_SKIPPED,
                format!("Target column '{}' has no values; skipping class balancing", target),
                Severity::Medium,
            );
            return Ok((dataset.clone(), 0));
        }
        debug!("Class distribution of '{}': {:?}", target, distribution);

        let plan = self.plan(&distribution);
        if plan.is_empty() {
            ctx.warn(
                codes::CLASS_BALANCE_INFO,
                format!(
                    "Column '{}' is already balanced across {} classes",
                    target,
                    distribution.len()
                ),
                Severity::Low,
            );
            return Ok((dataset.clone(), 0));
        }

        let mut synthetic: Vec<Record> = Vec::new();
        for (step, (label, needed)) in plan.iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.column_progress(label, step, plan.len());

            let members: Vec<&Record> = dataset
                .records()
                .iter()
                .filter(|r| {
                    let value = r.value_at(target_index);
                    !value.is_missing() && value.to_label() == *label
                })
                .collect();
            let sampler = ClassSampler::new(dataset.columns(), &members, target_index);

            debug!("Generating {} records for class '{}'", needed, label);
            synthetic.extend((0..*needed).map(|_| sampler.sample(rng)));
        }

        let count = synthetic.len();
        ctx.warn(
            codes::CLASS_BALANCE_COMPLETE,
            format!(
                "Generated {} synthetic records for {} minority classes in column '{}'",
                count,
                plan.len(),
                target
            ),
            Severity::Low,
        );
        info!("Balancing appended {} synthetic records", count);

        Ok((dataset.appended(synthetic), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CancellationToken;
    use crate::reporting::RunReport;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn labelled(counts: &[(&str, usize)]) -> Dataset {
        let mut records = Vec::new();
        let mut n = 0;
        for (label, count) in counts {
            for _ in 0..*count {
                n += 1;
                records.push(
                    Record::new()
                        .with("score", (n as f64) * 1.5)
                        .with("note", format!("entry number {} looks fine", n))
                        .with("label", *label),
                );
            }
        }
        Dataset::new(records).unwrap()
    }

    fn run(ds: &Dataset, target: &str, seed: u64) -> (Dataset, usize, RunReport) {
        let report = RunReport::new();
        let token = CancellationToken::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let (out, count) = Balancer::default()
            .balance(ds, target, &mut rng, &StageContext::new(&report, &token))
            .unwrap();
        (out, count, report)
    }

    #[test]
    fn test_plan_fills_to_target_ratio() {
        let distribution = vec![
            ("a".to_string(), 10),
            ("b".to_string(), 2),
            ("c".to_string(), 8),
        ];
        // c sits exactly at 0.8 * 10 and is not a minority
        assert_eq!(Balancer::default().plan(&distribution), vec![("b".to_string(), 6)]);
    }

    #[test]
    fn test_plan_balanced_is_empty() {
        let distribution = vec![("yes".to_string(), 5), ("no".to_string(), 5)];
        assert!(Balancer::default().plan(&distribution).is_empty());
        assert!(Balancer::default().plan(&[]).is_empty());
    }

    #[test]
    fn test_minority_grows_to_goal() {
        let ds = labelled(&[("a", 10), ("b", 2)]);

        let (out, count, report) = run(&ds, "label", 42);

        assert_eq!(count, 6);
        assert_eq!(out.len(), 18);
        let distribution = class_distribution(&out.column("label").unwrap());
        assert_eq!(distribution, vec![("a".to_string(), 10), ("b".to_string(), 8)]);
        // Originals come first, untouched
        assert_eq!(&out.records()[..12], ds.records());
        assert!(
            report
                .warnings()
                .iter()
                .any(|w| w.kind == codes::CLASS_BALANCE_COMPLETE)
        );
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let ds = labelled(&[("a", 9), ("b", 1), ("c", 3)]);
        let (first, _, _) = run(&ds, "label", 7);
        let (second, _, _) = run(&ds, "label", 7);
        assert_eq!(first, second);
    }

    #[test]
    fn test_never_shrinks() {
        let cases: [&[(&str, usize)]; 3] = [
            &[("a", 1)],
            &[("a", 3), ("b", 3)],
            &[("a", 20), ("b", 1), ("c", 15)],
        ];
        for counts in cases {
            let ds = labelled(counts);
            let (out, count, _) = run(&ds, "label", 1);
            assert_eq!(out.len(), ds.len() + count);
        }
    }

    #[test]
    fn test_balanced_reports_info() {
        let ds = labelled(&[("x", 4), ("y", 4)]);
        let (out, count, report) = run(&ds, "label", 0);
        assert_eq!(count, 0);
        assert_eq!(out, ds);
        assert_eq!(report.warnings()[0].kind, codes::CLASS_BALANCE_INFO);
    }

    #[test]
    fn test_missing_target_is_skipped() {
        let ds = labelled(&[("a", 3), ("b", 1)]);
        let (out, count, report) = run(&ds, "nope", 0);
        assert_eq!(count, 0);
        assert_eq!(out, ds);
        let warning = &report.warnings()[0];
        assert_eq!(warning.kind, codes::CLASS_BALANCE_SKIPPED);
        assert_eq!(warning.severity, Severity::Medium);
    }

    #[test]
    fn test_empty_target_is_skipped() {
        let ds = Dataset::new(vec![
            Record::new().with("x", "1").with("label", Value::Missing),
            Record::new().with("x", "2").with("label", "null"),
        ])
        .unwrap();
        let (_, count, report) = run(&ds, "label", 0);
        assert_eq!(count, 0);
        assert_eq!(report.warnings()[0].kind, codes::CLASS_BALANCE_SKIPPED);
    }

    #[test]
    fn test_cancelled_before_generation() {
        let ds = labelled(&[("a", 10), ("b", 2)]);
        let report = RunReport::new();
        let token = CancellationToken::new();
        token.cancel();
        let mut rng = StdRng::seed_from_u64(0);

        let err = Balancer::default()
            .balance(&ds, "label", &mut rng, &StageContext::new(&report, &token))
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
