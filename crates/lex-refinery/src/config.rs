//! Configuration types for the refinery pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use crate::capabilities::CapabilityPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A class is a minority when its count is below this share of the largest class.
pub const DEFAULT_MINORITY_RATIO: f64 = 0.8;

/// Minority classes are topped up to this share of the largest class.
pub const DEFAULT_TARGET_RATIO: f64 = 0.8;

/// Columns whose local corrections touch fewer rows than this share are
/// offered to the text-correction capability.
pub const DEFAULT_ENRICHMENT_TRIGGER_RATIO: f64 = 0.1;

const DEFAULT_CAPABILITY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CAPABILITY_MAX_RETRIES: u32 = 2;
const DEFAULT_CAPABILITY_BACKOFF_MS: u64 = 250;
const DEFAULT_CAPABILITY_MAX_CONCURRENCY: usize = 4;

/// Configuration for the refinery pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API. Unknown fields are rejected when deserializing; missing
/// fields take their defaults.
///
/// # Example
///
/// ```rust,ignore
/// use lex_refinery::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .balance_classes(true)
///     .target_column("label")
///     .seed(7)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Run the text normalization stage.
    /// Default: true
    pub fix_typos: bool,

    /// Run the label normalization stage.
    /// Default: true
    pub normalize_labels: bool,

    /// Run the imputation stage.
    /// Default: true
    pub fill_missing: bool,

    /// Run the class balancing stage.
    /// Default: false
    pub balance_classes: bool,

    /// Column holding the class label for balancing.
    /// If None, the pipeline auto-detects one.
    /// Default: None
    pub target_column: Option<String>,

    /// Minority threshold as a share of the largest class (0.0 - 1.0].
    /// Default: 0.8
    pub minority_ratio: f64,

    /// Fill level for minority classes as a share of the largest class (0.0 - 1.0].
    /// Default: 0.8
    pub target_ratio: f64,

    /// Seed for synthetic record generation. None draws from entropy.
    /// Default: None
    pub seed: Option<u64>,

    /// Local-correction share below which a text column is sent for enrichment.
    /// Default: 0.1
    pub enrichment_trigger_ratio: f64,

    /// Per-call timeout for enrichment capabilities, in milliseconds.
    /// Default: 10000
    pub capability_timeout_ms: u64,

    /// Retries after a failed or timed-out enrichment call.
    /// Default: 2
    pub capability_max_retries: u32,

    /// Fixed pause between enrichment retries, in milliseconds.
    /// Default: 250
    pub capability_backoff_ms: u64,

    /// Maximum enrichment calls in flight at once.
    /// Default: 4
    pub capability_max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fix_typos: true,
            normalize_labels: true,
            fill_missing: true,
            balance_classes: false,
            target_column: None,
            minority_ratio: DEFAULT_MINORITY_RATIO,
            target_ratio: DEFAULT_TARGET_RATIO,
            seed: None,
            enrichment_trigger_ratio: DEFAULT_ENRICHMENT_TRIGGER_RATIO,
            capability_timeout_ms: DEFAULT_CAPABILITY_TIMEOUT_MS,
            capability_max_retries: DEFAULT_CAPABILITY_MAX_RETRIES,
            capability_backoff_ms: DEFAULT_CAPABILITY_BACKOFF_MS,
            capability_max_concurrency: DEFAULT_CAPABILITY_MAX_CONCURRENCY,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("minority_ratio", self.minority_ratio),
            ("target_ratio", self.target_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigValidationError::InvalidRatio {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if !(0.0..=1.0).contains(&self.enrichment_trigger_ratio) {
            return Err(ConfigValidationError::InvalidRatio {
                field: "enrichment_trigger_ratio".to_string(),
                value: self.enrichment_trigger_ratio,
            });
        }

        if self.capability_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }

        if self.capability_max_concurrency == 0 {
            return Err(ConfigValidationError::InvalidConcurrency(
                self.capability_max_concurrency,
            ));
        }

        if let Some(target) = &self.target_column
            && target.trim().is_empty()
        {
            return Err(ConfigValidationError::EmptyTargetColumn);
        }

        Ok(())
    }

    /// The call policy handed to the capability runner.
    pub fn capability_policy(&self) -> CapabilityPolicy {
        CapabilityPolicy {
            timeout: Duration::from_millis(self.capability_timeout_ms),
            max_retries: self.capability_max_retries,
            backoff: Duration::from_millis(self.capability_backoff_ms),
            max_concurrency: self.capability_max_concurrency,
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid ratio for '{field}': {value} (must be in (0.0, 1.0])")]
    InvalidRatio { field: String, value: f64 },

    #[error("Invalid capability timeout: must be greater than zero")]
    InvalidTimeout,

    #[error("Invalid capability concurrency: {0} (must be at least 1)")]
    InvalidConcurrency(usize),

    #[error("Target column name must not be empty")]
    EmptyTargetColumn,
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    fix_typos: Option<bool>,
    normalize_labels: Option<bool>,
    fill_missing: Option<bool>,
    balance_classes: Option<bool>,
    target_column: Option<String>,
    minority_ratio: Option<f64>,
    target_ratio: Option<f64>,
    seed: Option<u64>,
    enrichment_trigger_ratio: Option<f64>,
    capability_timeout_ms: Option<u64>,
    capability_max_retries: Option<u32>,
    capability_backoff_ms: Option<u64>,
    capability_max_concurrency: Option<usize>,
}

impl PipelineConfigBuilder {
    /// Enable or disable the text normalization stage.
    pub fn fix_typos(mut self, enable: bool) -> Self {
        self.fix_typos = Some(enable);
        self
    }

    /// Enable or disable the label normalization stage.
    pub fn normalize_labels(mut self, enable: bool) -> Self {
        self.normalize_labels = Some(enable);
        self
    }

    /// Enable or disable missing-value imputation.
    pub fn fill_missing(mut self, enable: bool) -> Self {
        self.fill_missing = Some(enable);
        self
    }

    /// Enable or disable class balancing.
    pub fn balance_classes(mut self, enable: bool) -> Self {
        self.balance_classes = Some(enable);
        self
    }

    /// Set an explicit target column.
    ///
    /// If not set, the pipeline will auto-detect the target column.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Set the minority threshold (share of the largest class).
    pub fn minority_ratio(mut self, ratio: f64) -> Self {
        self.minority_ratio = Some(ratio);
        self
    }

    /// Set the fill level for minority classes (share of the largest class).
    pub fn target_ratio(mut self, ratio: f64) -> Self {
        self.target_ratio = Some(ratio);
        self
    }

    /// Seed the synthetic record generator for reproducible output.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the local-correction share that triggers enrichment.
    pub fn enrichment_trigger_ratio(mut self, ratio: f64) -> Self {
        self.enrichment_trigger_ratio = Some(ratio);
        self
    }

    /// Set the per-call capability timeout in milliseconds.
    pub fn capability_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.capability_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the number of retries per capability call.
    pub fn capability_max_retries(mut self, retries: u32) -> Self {
        self.capability_max_retries = Some(retries);
        self
    }

    /// Set the fixed backoff between capability retries in milliseconds.
    pub fn capability_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.capability_backoff_ms = Some(backoff_ms);
        self
    }

    /// Set the maximum number of concurrent capability calls.
    pub fn capability_max_concurrency(mut self, max: usize) -> Self {
        self.capability_max_concurrency = Some(max);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            fix_typos: self.fix_typos.unwrap_or(defaults.fix_typos),
            normalize_labels: self.normalize_labels.unwrap_or(defaults.normalize_labels),
            fill_missing: self.fill_missing.unwrap_or(defaults.fill_missing),
            balance_classes: self.balance_classes.unwrap_or(defaults.balance_classes),
            target_column: self.target_column,
            minority_ratio: self.minority_ratio.unwrap_or(defaults.minority_ratio),
            target_ratio: self.target_ratio.unwrap_or(defaults.target_ratio),
            seed: self.seed,
            enrichment_trigger_ratio: self
                .enrichment_trigger_ratio
                .unwrap_or(defaults.enrichment_trigger_ratio),
            capability_timeout_ms: self
                .capability_timeout_ms
                .unwrap_or(defaults.capability_timeout_ms),
            capability_max_retries: self
                .capability_max_retries
                .unwrap_or(defaults.capability_max_retries),
            capability_backoff_ms: self
                .capability_backoff_ms
                .unwrap_or(defaults.capability_backoff_ms),
            capability_max_concurrency: self
                .capability_max_concurrency
                .unwrap_or(defaults.capability_max_concurrency),
        };

        config.validate()?;
        Ok(config)
    }
}
