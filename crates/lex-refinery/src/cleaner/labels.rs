//! Categorical label normalization.
//!
//! Variants that only differ in case or surrounding whitespace are clustered
//! and rewritten to the group's most frequent spelling. Injected
//! capabilities can then merge semantically equivalent groups
//! ([`LabelMatcher`]) and reassign rare one-off values
//! ([`ZeroShotClassifier`]), always onto labels already present in the
//! column.

use crate::capabilities::{CapabilityRunner, LabelMatcher, ZeroShotClassifier};
use crate::dataset::{Dataset, Record, Value};
use crate::error::Result;
use crate::pipeline::StageContext;
use crate::reporting::codes;
use crate::types::Severity;
use crate::utils::{ordered_counts, unique_stats};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A label column has fewer distinct present values than this.
pub const MAX_LABEL_CLASSES: usize = 50;

/// Unique ratio below which a column is treated as a label column.
pub const LABEL_UNIQUE_RATIO: f64 = 0.1;

/// Minimum classifier confidence for reassigning a rare value.
pub const ZERO_SHOT_MIN_CONFIDENCE: f64 = 0.85;

/// Rare-value reassignment needs at least this many distinct labels.
const ZERO_SHOT_MIN_LABELS: usize = 3;

/// Case/whitespace-insensitive equivalence class of label spellings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelGroup {
    /// Most frequent spelling; ties go to the first one seen.
    pub canonical: String,
    /// Every spelling with its count, in first-seen order.
    pub members: Vec<(String, usize)>,
}

/// Group the string values of a column by `lowercase(trim(value))`.
///
/// Groups come back in first-seen order. Missing and non-string values are
/// ignored.
pub fn cluster_labels<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<LabelGroup> {
    let spellings = ordered_counts(
        values
            .into_iter()
            .filter(|v| !v.is_missing())
            .filter_map(Value::as_str),
    );

    let mut groups: Vec<(String, Vec<(String, usize)>)> = Vec::new();
    for (spelling, count) in spellings {
        let key = spelling.trim().to_lowercase();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push((spelling.to_string(), count)),
            None => groups.push((key, vec![(spelling.to_string(), count)])),
        }
    }

    groups
        .into_iter()
        .map(|(_, members)| {
            let mut best = &members[0];
            for member in &members[1..] {
                if member.1 > best.1 {
                    best = member;
                }
            }
            LabelGroup {
                canonical: best.0.clone(),
                members,
            }
        })
        .collect()
}

/// Observed spelling -> canonical spelling, for spellings that change.
pub fn build_normalization_map(groups: &[LabelGroup]) -> HashMap<String, String> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .members
                .iter()
                .filter(|(spelling, _)| *spelling != group.canonical)
                .map(|(spelling, _)| (spelling.clone(), group.canonical.clone()))
        })
        .collect()
}

/// Whether a column holds class labels: unique ratio below
/// [`LABEL_UNIQUE_RATIO`] and between 2 and [`MAX_LABEL_CLASSES`] - 1
/// distinct present values.
pub fn is_label_column(values: &[&Value]) -> bool {
    matches!(
        unique_stats(values.iter().copied()),
        Some((unique, ratio)) if ratio < LABEL_UNIQUE_RATIO && unique > 1 && unique < MAX_LABEL_CLASSES
    )
}

/// Clusters label variants in categorical columns.
#[derive(Default)]
pub struct LabelNormalizer {
    matcher: Option<(Arc<dyn LabelMatcher>, Arc<CapabilityRunner>)>,
    classifier: Option<(Arc<dyn ZeroShotClassifier>, Arc<CapabilityRunner>)>,
}

impl LabelNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge canonical groups the matcher considers equivalent.
    pub fn with_matcher(mut self, matcher: Arc<dyn LabelMatcher>, runner: Arc<CapabilityRunner>) -> Self {
        self.matcher = Some((matcher, runner));
        self
    }

    /// Reassign one-off values the classifier confidently places in an
    /// existing class.
    pub fn with_classifier(
        mut self,
        classifier: Arc<dyn ZeroShotClassifier>,
        runner: Arc<CapabilityRunner>,
    ) -> Self {
        self.classifier = Some((classifier, runner));
        self
    }

    /// Normalize every label column; returns the new dataset and the number
    /// of rewritten cells.
    pub fn normalize(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<(Dataset, usize)> {
        let mut records: Vec<Record> = dataset.records().to_vec();
        let width = dataset.width();
        let mut rewritten = 0;
        let mut label_columns = 0;

        for (index, column) in dataset.columns().iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.column_progress(column, index, width);

            let values = dataset.column_at(index);
            if !is_label_column(&values) {
                continue;
            }
            label_columns += 1;

            let groups = cluster_labels(values.iter().copied());
            let mut mapping = build_normalization_map(&groups);
            debug!(
                "Column '{}': {} label groups, {} variant spellings",
                column,
                groups.len(),
                mapping.len()
            );

            if self.matcher.is_some() || self.classifier.is_some() {
                ctx.check_cancelled()?;
                let labels: Vec<String> = groups.iter().map(|g| g.canonical.clone()).collect();
                self.match_labels(column, &labels, &mut mapping, ctx);

                let counts = resolved_counts(&groups, &mapping);
                self.reassign_rare(column, &counts, &mut mapping, ctx);
            }

            for (row, value) in values.iter().enumerate() {
                if let Value::String(s) = value
                    && let Some(canonical) = mapping.get(s)
                    && canonical != s
                {
                    records[row].set_at(index, Value::String(canonical.clone()));
                    rewritten += 1;
                }
            }
        }

        ctx.warn(
            codes::LABEL_NORMALIZATION_COMPLETE,
            format!(
                "Normalized {} values across {} categorical columns",
                rewritten, label_columns
            ),
            Severity::Low,
        );
        info!("Label normalization rewrote {} values", rewritten);

        Ok((
            Dataset::from_aligned(dataset.columns().to_vec(), records),
            rewritten,
        ))
    }

    fn match_labels(
        &self,
        column: &str,
        labels: &[String],
        mapping: &mut HashMap<String, String>,
        ctx: &StageContext<'_>,
    ) {
        let Some((matcher, runner)) = &self.matcher else {
            return;
        };

        let call = {
            let matcher = Arc::clone(matcher);
            let labels = labels.to_vec();
            move || matcher.embed_and_match(&labels, &labels)
        };

        match runner.call(call) {
            Ok(matches) => {
                let mut absorbed: HashSet<&str> = HashSet::new();
                for label in labels {
                    let Some(target) = matches.get(label) else {
                        continue;
                    };
                    if target == label
                        || !labels.contains(target)
                        || absorbed.contains(target.as_str())
                    {
                        continue;
                    }
                    debug!("{} merges '{}' into '{}' in '{}'", matcher.name(), label, target, column);
                    redirect(mapping, label, target);
                    absorbed.insert(label.as_str());
                }
            }
            Err(e) => {
                warn!("{} label matching failed for '{}': {}", matcher.name(), column, e);
                ctx.warn(
                    codes::LABEL_ENRICHMENT_FAILED,
                    format!("Label matching for column '{}' failed: {}", column, e),
                    Severity::Low,
                );
            }
        }
    }

    fn reassign_rare(
        &self,
        column: &str,
        counts: &[(String, usize)],
        mapping: &mut HashMap<String, String>,
        ctx: &StageContext<'_>,
    ) {
        let Some((classifier, runner)) = &self.classifier else {
            return;
        };
        if counts.len() < ZERO_SHOT_MIN_LABELS {
            return;
        }

        let established: Vec<String> = counts
            .iter()
            .filter(|(_, count)| *count > 1)
            .map(|(label, _)| label.clone())
            .collect();
        let rare: Vec<&String> = counts
            .iter()
            .filter(|(_, count)| *count == 1)
            .map(|(label, _)| label)
            .collect();
        if rare.is_empty() || established.is_empty() {
            return;
        }

        let calls: Vec<_> = rare
            .iter()
            .map(|label| {
                let classifier = Arc::clone(classifier);
                let text = (*label).clone();
                let candidates = established.clone();
                move || classifier.classify(&text, &candidates)
            })
            .collect();

        let mut failures = 0;
        let mut first_error = None;
        for (label, result) in rare.iter().zip(runner.call_batch(calls)) {
            match result {
                Ok(c) if c.confidence >= ZERO_SHOT_MIN_CONFIDENCE && established.contains(&c.label) => {
                    debug!(
                        "{} reassigns '{}' to '{}' ({:.2}) in '{}'",
                        classifier.name(),
                        label,
                        c.label,
                        c.confidence,
                        column
                    );
                    redirect(mapping, label, &c.label);
                }
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            warn!("{} failed on {} values in '{}': {}", classifier.name(), failures, column, e);
            ctx.warn(
                codes::LABEL_ENRICHMENT_FAILED,
                format!(
                    "Classification of {} rare values in column '{}' failed (first: {})",
                    failures, column, e
                ),
                Severity::Low,
            );
        }
    }
}

/// Point `from` and everything already resolving to it at `to`.
fn redirect(mapping: &mut HashMap<String, String>, from: &str, to: &str) {
    for target in mapping.values_mut() {
        if target == from {
            *target = to.to_string();
        }
    }
    mapping.insert(from.to_string(), to.to_string());
}

/// Label counts after applying `mapping`, in first-seen order.
fn resolved_counts(groups: &[LabelGroup], mapping: &HashMap<String, String>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for (spelling, count) in groups.iter().flat_map(|g| g.members.iter()) {
        let label = mapping.get(spelling).unwrap_or(spelling);
        match counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, total)) => *total += count,
            None => counts.push((label.clone(), *count)),
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityError, CapabilityPolicy, Classification};
    use crate::pipeline::CancellationToken;
    use crate::reporting::RunReport;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn runner() -> Arc<CapabilityRunner> {
        Arc::new(
            CapabilityRunner::new(CapabilityPolicy {
                timeout: Duration::from_millis(200),
                max_retries: 0,
                backoff: Duration::from_millis(1),
                max_concurrency: 2,
            })
            .unwrap(),
        )
    }

    fn column_dataset(name: &str, values: &[&str]) -> Dataset {
        Dataset::new(values.iter().map(|v| Record::new().with(name, *v)).collect()).unwrap()
    }

    /// `n` copies of each `(value, n)` pair, in order.
    fn repeated(counts: &[(&'static str, usize)]) -> Vec<&'static str> {
        counts
            .iter()
            .flat_map(|(value, n)| std::iter::repeat_n(*value, *n))
            .collect()
    }

    fn run(normalizer: &LabelNormalizer, ds: &Dataset) -> (Dataset, usize, RunReport) {
        let report = RunReport::new();
        let token = CancellationToken::new();
        let (out, count) = normalizer
            .normalize(ds, &StageContext::new(&report, &token))
            .unwrap();
        (out, count, report)
    }

    #[test]
    fn test_cluster_case_variants_into_two_groups() {
        let values: Vec<Value> = ["male", "Male", "MALE", "female"]
            .iter()
            .map(|s| Value::text(*s))
            .collect();

        let groups = cluster_labels(&values);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members.len(), 3);
        assert_eq!(groups[0].canonical, "male");
        assert_eq!(groups[1].canonical, "female");
        assert_eq!(groups[1].members, vec![("female".to_string(), 1)]);
    }

    #[test]
    fn test_canonical_is_most_frequent_spelling() {
        let values: Vec<Value> = ["M", "m", "m", " M ", "F"].iter().map(|s| Value::text(*s)).collect();
        let groups = cluster_labels(&values);
        let mapping = build_normalization_map(&groups);

        assert_eq!(groups[0].canonical, "m");
        assert_eq!(mapping.get("M").map(String::as_str), Some("m"));
        assert_eq!(mapping.get(" M ").map(String::as_str), Some("m"));
        assert!(!mapping.contains_key("F"));
    }

    #[test]
    fn test_normalize_rewrites_variants_in_label_columns() {
        let ds = column_dataset(
            "status",
            &repeated(&[("active", 30), ("Active", 3), ("inactive", 20), ("INACTIVE ", 1)]),
        );

        let (out, count, report) = run(&LabelNormalizer::new(), &ds);

        assert_eq!(count, 4);
        let labels: HashSet<String> = out.column_at(0).iter().map(|v| v.to_label()).collect();
        assert_eq!(labels, HashSet::from(["active".to_string(), "inactive".to_string()]));
        assert!(report.warnings().iter().any(|w| w.kind == codes::LABEL_NORMALIZATION_COMPLETE));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let ds = column_dataset("status", &repeated(&[("yes", 25), ("YES", 4), ("no", 11)]));

        let (once, first, _) = run(&LabelNormalizer::new(), &ds);
        let (twice, second, _) = run(&LabelNormalizer::new(), &once);

        assert_eq!(first, 4);
        assert_eq!(second, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_high_cardinality_column_untouched() {
        let ds = column_dataset("name", &["Ann", "ann", "Bob", "Cid"]);
        let (out, count, _) = run(&LabelNormalizer::new(), &ds);
        assert_eq!(count, 0);
        assert_eq!(out, ds);
    }

    struct SynonymMatcher;

    impl LabelMatcher for SynonymMatcher {
        fn embed_and_match(
            &self,
            values: &[String],
            _reference: &[String],
        ) -> std::result::Result<HashMap<String, String>, CapabilityError> {
            Ok(values
                .iter()
                .filter(|v| v.as_str() == "approved")
                .map(|v| (v.clone(), "accepted".to_string()))
                .collect())
        }
        fn name(&self) -> &str {
            "synonyms"
        }
    }

    #[test]
    fn test_matcher_merges_groups() {
        let ds = column_dataset(
            "decision",
            &repeated(&[("accepted", 20), ("approved", 3), ("rejected", 15)]),
        );
        let normalizer = LabelNormalizer::new().with_matcher(Arc::new(SynonymMatcher), runner());

        let (out, count, _) = run(&normalizer, &ds);

        assert_eq!(count, 3);
        assert!(out.column_at(0).iter().all(|v| v.to_label() != "approved"));
    }

    struct FailingMatcher;

    impl LabelMatcher for FailingMatcher {
        fn embed_and_match(
            &self,
            _values: &[String],
            _reference: &[String],
        ) -> std::result::Result<HashMap<String, String>, CapabilityError> {
            Err(CapabilityError::Timeout)
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_matcher_failure_degrades_to_local_result() {
        let ds = column_dataset("status", &repeated(&[("on", 25), ("ON", 5), ("off", 10)]));
        let normalizer = LabelNormalizer::new().with_matcher(Arc::new(FailingMatcher), runner());

        let (out, count, report) = run(&normalizer, &ds);
        let (local, local_count, _) = run(&LabelNormalizer::new(), &ds);

        assert_eq!(count, local_count);
        assert_eq!(out, local);
        let warning = report
            .warnings()
            .into_iter()
            .find(|w| w.kind == codes::LABEL_ENRICHMENT_FAILED)
            .unwrap();
        assert_eq!(warning.severity, Severity::Low);
    }

    struct PrefixClassifier {
        confidence: f64,
    }

    impl ZeroShotClassifier for PrefixClassifier {
        fn classify(
            &self,
            text: &str,
            labels: &[String],
        ) -> std::result::Result<Classification, CapabilityError> {
            let label = labels
                .iter()
                .find(|l| text.starts_with(&l[..2]))
                .cloned()
                .ok_or_else(|| CapabilityError::InvalidResponse("no match".to_string()))?;
            Ok(Classification {
                label,
                confidence: self.confidence,
            })
        }
        fn name(&self) -> &str {
            "prefix"
        }
    }

    #[test]
    fn test_classifier_reassigns_confident_singletons() {
        let values = repeated(&[("red", 20), ("green", 15), ("blue", 15), ("gren", 1)]);
        let ds = column_dataset("colour", &values);

        let confident = LabelNormalizer::new()
            .with_classifier(Arc::new(PrefixClassifier { confidence: 0.9 }), runner());
        let (out, count, _) = run(&confident, &ds);
        assert_eq!(count, 1);
        assert_eq!(out.column_at(0).last().map(|v| v.to_label()), Some("green".to_string()));

        let unsure = LabelNormalizer::new()
            .with_classifier(Arc::new(PrefixClassifier { confidence: 0.5 }), runner());
        let (_, count, _) = run(&unsure, &ds);
        assert_eq!(count, 0);
    }
}
