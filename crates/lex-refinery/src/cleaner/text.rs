//! Free-text normalization.

use super::dictionary::{canonical_label, fix_misspellings};
use crate::capabilities::{CapabilityRunner, TextCorrector};
use crate::config::DEFAULT_ENRICHMENT_TRIGGER_RATIO;
use crate::dataset::{Dataset, Record, Value};
use crate::error::Result;
use crate::pipeline::StageContext;
use crate::reporting::codes;
use crate::types::Severity;
use crate::utils::{ordered_counts, truncate_str};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows sampled from the top of a column to decide whether it holds free text.
pub const TEXT_SAMPLE_ROWS: usize = 100;

/// A sampled string must be longer than this (in characters) to count as text.
pub const TEXT_MIN_CHARS: usize = 10;

/// Punctuation that never takes a space in front of it.
const CLOSING_PUNCTUATION: [char; 6] = [',', '.', ';', ':', '!', '?'];

static SPACE_AFTER_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([,;!?])(\p{L})").expect("Invalid regex: punctuation spacing"));

static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Ll})\.(\p{Lu})").expect("Invalid regex: sentence boundary"));

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Ll}{2})(\p{Lu})").expect("Invalid regex: camel case"));

/// Deterministic text repairs plus optional enrichment through a
/// [`TextCorrector`].
///
/// Whole-cell label variants (`MALE` -> `Male`) are fixed in every column.
/// The word-level repairs only run on free-text columns, see
/// [`is_text_column`].
pub struct TextNormalizer {
    enrichment: Option<(Arc<dyn TextCorrector>, Arc<CapabilityRunner>)>,
    trigger_ratio: f64,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self {
            enrichment: None,
            trigger_ratio: DEFAULT_ENRICHMENT_TRIGGER_RATIO,
        }
    }

    /// Send lightly-corrected text columns through `corrector`.
    pub fn with_corrector(
        mut self,
        corrector: Arc<dyn TextCorrector>,
        runner: Arc<CapabilityRunner>,
    ) -> Self {
        self.enrichment = Some((corrector, runner));
        self
    }

    /// Share of rows below which a column's local corrections trigger enrichment.
    pub fn trigger_ratio(mut self, ratio: f64) -> Self {
        self.trigger_ratio = ratio;
        self
    }

    /// Normalize every column; returns the new dataset and the number of
    /// cells whose text changed.
    pub fn normalize(&self, dataset: &Dataset, ctx: &StageContext<'_>) -> Result<(Dataset, usize)> {
        let mut records: Vec<Record> = dataset.records().to_vec();
        let width = dataset.width();
        let mut corrections = 0;
        let mut text_columns = 0;

        info!("Normalizing text across {} columns", width);

        for (index, column) in dataset.columns().iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.column_progress(column, index, width);

            let values = dataset.column_at(index);
            let is_text = is_text_column(&values);
            let mut changed = vec![false; values.len()];

            for (row, value) in values.iter().enumerate() {
                let Value::String(original) = value else {
                    continue;
                };
                if value.is_missing() {
                    continue;
                }
                let fixed = match canonical_label(original) {
                    Some(label) => label.to_string(),
                    None if is_text => normalize_text(original),
                    None => continue,
                };
                if fixed != *original {
                    records[row].set_at(index, Value::String(fixed));
                    changed[row] = true;
                }
            }

            let mut column_corrections = changed.iter().filter(|c| **c).count();
            if is_text {
                text_columns += 1;
                debug!(
                    "Column '{}' is free text: {} local corrections",
                    column, column_corrections
                );
                if (column_corrections as f64) < self.trigger_ratio * dataset.len() as f64 {
                    ctx.check_cancelled()?;
                    column_corrections += self.enrich_column(column, index, &mut records, &changed, ctx);
                }
            }
            corrections += column_corrections;
        }

        ctx.warn(
            codes::TYPO_CORRECTION_COMPLETE,
            format!(
                "Corrected {} values ({} text columns detected)",
                corrections, text_columns
            ),
            Severity::Low,
        );
        info!("Text normalization corrected {} values", corrections);

        Ok((
            Dataset::from_aligned(dataset.columns().to_vec(), records),
            corrections,
        ))
    }

    /// Offer the still-uncorrected values of one column to the corrector.
    ///
    /// Identical texts are sent once. Returns the number of cells changed.
    fn enrich_column(
        &self,
        column: &str,
        index: usize,
        records: &mut [Record],
        changed: &[bool],
        ctx: &StageContext<'_>,
    ) -> usize {
        let Some((corrector, runner)) = &self.enrichment else {
            return 0;
        };

        let pending: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter(|(row, _)| !changed[*row])
            .filter_map(|(row, record)| {
                let value = record.value_at(index);
                match value {
                    Value::String(s) if !value.is_missing() => Some((row, s.clone())),
                    _ => None,
                }
            })
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let texts: Vec<String> = ordered_counts(pending.iter().map(|(_, text)| text.clone()))
            .into_iter()
            .map(|(text, _)| text)
            .collect();
        debug!(
            "Sending {} distinct values of '{}' to {}",
            texts.len(),
            column,
            corrector.name()
        );

        let calls: Vec<_> = texts
            .iter()
            .map(|text| {
                let corrector = Arc::clone(corrector);
                let text = text.clone();
                move || corrector.correct(&text)
            })
            .collect();
        let results = runner.call_batch(calls);

        let mut corrected: Vec<(&str, String)> = Vec::new();
        let mut failures = Vec::new();
        for (text, result) in texts.iter().zip(results) {
            match result {
                Ok(answer) => {
                    let answer = answer.trim();
                    if !answer.is_empty() && answer != text {
                        corrected.push((text.as_str(), answer.to_string()));
                    }
                }
                Err(e) => failures.push((text.as_str(), e)),
            }
        }

        let mut count = 0;
        for (row, text) in &pending {
            if let Some((_, answer)) = corrected.iter().find(|(original, _)| original == text) {
                records[*row].set_at(index, Value::String(answer.clone()));
                count += 1;
            }
        }

        if let Some((text, first_error)) = failures.first() {
            warn!(
                "{} could not correct {} values in '{}': {}",
                corrector.name(),
                failures.len(),
                column,
                first_error
            );
            ctx.warn(
                codes::TYPO_ENRICHMENT_FAILED,
                format!(
                    "{} of {} values in column '{}' left unchanged after enrichment failed (first: \"{}\": {})",
                    failures.len(),
                    texts.len(),
                    column,
                    truncate_str(text, 40),
                    first_error
                ),
                Severity::Low,
            );
        }

        count
    }
}

/// Whether a column holds free text.
///
/// Looks at the first [`TEXT_SAMPLE_ROWS`] rows: more than half of the
/// present values must be strings longer than [`TEXT_MIN_CHARS`] characters.
pub fn is_text_column(values: &[&Value]) -> bool {
    let sample: Vec<&Value> = values
        .iter()
        .take(TEXT_SAMPLE_ROWS)
        .filter(|v| !v.is_missing())
        .copied()
        .collect();
    if sample.is_empty() {
        return false;
    }
    let long = sample
        .iter()
        .filter(|v| v.as_str().is_some_and(|s| s.trim().chars().count() > TEXT_MIN_CHARS))
        .count();
    long as f64 / sample.len() as f64 > 0.5
}

/// Apply the local repairs to one free-text value, in order: misspellings,
/// whitespace, punctuation spacing, camel-case boundaries.
pub fn normalize_text(text: &str) -> String {
    let fixed = fix_misspellings(text);
    let collapsed = collapse_whitespace(&fixed);
    let punctuated = repair_punctuation(&collapsed);
    split_camel_case(&punctuated)
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Emails, URLs and `www.` hosts are left alone by punctuation and
/// camel-case repairs.
fn is_protected(token: &str) -> bool {
    token.contains('@') || token.contains("://") || token.contains("www.")
}

/// No space before `, . ; : ! ?`; one space after `, ; ! ?` when a letter
/// follows, and after `.` between a lowercase and an uppercase letter.
///
/// Expects whitespace already collapsed.
pub fn repair_punctuation(text: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    for token in text.split(' ').filter(|t| !t.is_empty()) {
        let lead: usize = token
            .chars()
            .take_while(|c| CLOSING_PUNCTUATION.contains(c))
            .map(char::len_utf8)
            .sum();
        match tokens.last_mut() {
            Some(previous) if lead > 0 && !is_protected(token) => {
                previous.push_str(&token[..lead]);
                if lead < token.len() {
                    tokens.push(token[lead..].to_string());
                }
            }
            _ => tokens.push(token.to_string()),
        }
    }

    tokens
        .iter()
        .map(|token| {
            if is_protected(token) {
                return token.clone();
            }
            let spaced = SPACE_AFTER_PUNCTUATION.replace_all(token, "${1} ${2}");
            SENTENCE_BOUNDARY.replace_all(&spaced, "${1}. ${2}").into_owned()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Insert a space at `lowerUpper` boundaries preceded by at least two
/// lowercase letters (`helloWorld` -> `hello World`, `iPhone` unchanged).
pub fn split_camel_case(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            if is_protected(token) {
                token.to_string()
            } else {
                CAMEL_BOUNDARY.replace_all(token, "${1} ${2}").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
