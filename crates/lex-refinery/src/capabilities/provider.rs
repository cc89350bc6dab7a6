//! Capability traits for optional enrichment calls.
//!
//! The pipeline never depends on these capabilities: each one is injected
//! through the [`Pipeline`](crate::Pipeline) builder, invoked through the
//! [`CapabilityRunner`](super::CapabilityRunner) call policy, and any failure
//! leaves the affected value unchanged.
//!
//! # Implementing a New Provider
//!
//! 1. Create a new file in `src/capabilities/` (e.g., `ollama.rs`)
//! 2. Implement one or more of the traits below for your provider struct
//! 3. Export the provider in `src/capabilities/mod.rs`
//!
//! Implementations are called from worker threads and must be `Send + Sync`.
//! They may block; the runner bounds each call with a timeout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Failure of a single capability call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The call did not finish within the policy timeout.
    #[error("capability call timed out")]
    Timeout,

    /// The call failed (transport error, HTTP error, panic in the provider).
    #[error("capability call failed: {0}")]
    Failed(String),

    /// The provider answered, but the answer could not be used.
    #[error("invalid capability response: {0}")]
    InvalidResponse(String),
}

impl CapabilityError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Failed(_))
    }
}

impl From<anyhow::Error> for CapabilityError {
    fn from(err: anyhow::Error) -> Self {
        CapabilityError::Failed(err.to_string())
    }
}

/// Result of a zero-shot classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// Corrects spelling and grammar of free text.
pub trait TextCorrector: Send + Sync {
    /// Return the corrected form of `text`.
    ///
    /// Returning the input unchanged is a valid answer.
    fn correct(&self, text: &str) -> Result<String, CapabilityError>;

    /// Provider name for logging and warnings.
    fn name(&self) -> &str;
}

/// Maps observed label values onto semantically equivalent reference labels.
pub trait LabelMatcher: Send + Sync {
    /// Return a mapping `value -> reference` for every value the provider
    /// considers equivalent to a reference label. Values without a match are
    /// simply absent from the mapping.
    fn embed_and_match(
        &self,
        values: &[String],
        reference: &[String],
    ) -> Result<HashMap<String, String>, CapabilityError>;

    /// Provider name for logging and warnings.
    fn name(&self) -> &str;
}

/// Assigns one of a fixed set of labels to a piece of text.
pub trait ZeroShotClassifier: Send + Sync {
    /// Classify `text` into one of `labels`.
    fn classify(&self, text: &str, labels: &[String]) -> Result<Classification, CapabilityError>;

    /// Provider name for logging and warnings.
    fn name(&self) -> &str;
}
