//! Synthetic record generation for one class.

use crate::dataset::{Record, Value};
use crate::profiler::classify;
use crate::types::ColumnType;
use crate::utils::{mean_and_std, ordered_counts, round2};
use rand::Rng;
use std::f64::consts::PI;

/// Tokens drawn per synthetic text value (inclusive range).
const MIN_TEXT_TOKENS: usize = 2;
const MAX_TEXT_TOKENS: usize = 5;

/// A text vocabulary needs this many distinct tokens to compose new values.
const MIN_VOCABULARY: usize = 3;

/// Standard normal draw via the Box-Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // (0, 1] so the logarithm stays finite
    let u1 = 1.0 - rng.gen_range(0.0..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * f64::ln(u1)).sqrt() * (2.0 * PI * u2).cos()
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnSampler {
    /// Always the same value (target label, empty classes).
    Fixed(Value),
    /// Normal draw rounded to two decimals.
    Normal { mean: f64, std_dev: f64 },
    /// Uniform draw from observed values.
    Observed(Vec<Value>),
    /// 2-5 tokens drawn with replacement from a vocabulary.
    Vocabulary(Vec<String>),
}

impl ColumnSampler {
    fn for_values(values: &[&Value]) -> Self {
        let present: Vec<Value> = values
            .iter()
            .filter(|v| !v.is_missing())
            .map(|v| (*v).clone())
            .collect();

        match classify(values.iter().copied()) {
            ColumnType::Numeric => {
                let numbers: Vec<f64> = present.iter().filter_map(Value::as_number).collect();
                match mean_and_std(&numbers) {
                    Some((mean, std_dev)) => ColumnSampler::Normal { mean, std_dev },
                    None => ColumnSampler::Fixed(Value::Number(0.0)),
                }
            }
            _ if present.is_empty() => ColumnSampler::Fixed(Value::Missing),
            ColumnType::Categorical => ColumnSampler::Observed(present),
            ColumnType::Text => {
                let vocabulary: Vec<String> = ordered_counts(
                    present
                        .iter()
                        .flat_map(|v| v.to_label().split_whitespace().map(str::to_string).collect::<Vec<_>>()),
                )
                .into_iter()
                .map(|(token, _)| token)
                .collect();

                if vocabulary.len() < MIN_VOCABULARY {
                    ColumnSampler::Observed(present)
                } else {
                    ColumnSampler::Vocabulary(vocabulary)
                }
            }
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        match self {
            ColumnSampler::Fixed(value) => value.clone(),
            ColumnSampler::Normal { mean, std_dev } => {
                Value::Number(round2(mean + std_dev * standard_normal(rng)))
            }
            ColumnSampler::Observed(values) => values[rng.gen_range(0..values.len())].clone(),
            ColumnSampler::Vocabulary(tokens) => {
                let count = rng.gen_range(MIN_TEXT_TOKENS..=MAX_TEXT_TOKENS);
                let words: Vec<&str> = (0..count)
                    .map(|_| tokens[rng.gen_range(0..tokens.len())].as_str())
                    .collect();
                Value::String(words.join(" "))
            }
        }
    }
}

/// Generates records that look like the members of one class.
///
/// Each column gets its own sampler, chosen by the column's type within the
/// class. The target column always holds the class's own label.
#[derive(Debug, Clone)]
pub struct ClassSampler {
    columns: Vec<String>,
    samplers: Vec<ColumnSampler>,
}

impl ClassSampler {
    /// Build samplers from the class's records.
    ///
    /// `members` must be non-empty and aligned with `columns`.
    pub fn new(columns: &[String], members: &[&Record], target_index: usize) -> Self {
        let samplers = (0..columns.len())
            .map(|index| {
                if index == target_index {
                    let label = members
                        .first()
                        .map(|r| r.value_at(index).clone())
                        .unwrap_or_default();
                    return ColumnSampler::Fixed(label);
                }
                let values: Vec<&Value> = members.iter().map(|r| r.value_at(index)).collect();
                ColumnSampler::for_values(&values)
            })
            .collect();

        Self {
            columns: columns.to_vec(),
            samplers,
        }
    }

    /// Draw one synthetic record.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Record {
        self.columns
            .iter()
            .zip(&self.samplers)
            .map(|(column, sampler)| (column.clone(), sampler.sample(rng)))
            .collect()
    }
}
