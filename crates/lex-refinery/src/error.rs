//! Custom error types for the refinery pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Stage code
//! returns these errors; the orchestrator turns them into report entries so
//! that callers of [`Pipeline::run`](crate::Pipeline::run) never see them
//! directly.
//!
//! Errors are serializable so they can be embedded in JSON reports.

use crate::capabilities::CapabilityError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the refinery pipeline.
#[derive(Error, Debug)]
pub enum RefineryError {
    /// Run was cancelled through its cancellation token.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record does not share the dataset's column set.
    #[error("Record {row} has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// The dataset has no records.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// A pipeline stage failed as a whole.
    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    /// No valid values found in a column for computation.
    #[error("No valid values found in column '{0}'")]
    NoValidValues(String),

    /// An enrichment capability failed.
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Internal error (e.g., runtime construction failure).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RefineryError>,
    },
}

impl RefineryError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RefineryError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code, used as the report entry type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::EmptyDataset => "EMPTY_DATASET",
            Self::StageFailed { .. } => "STAGE_FAILED",
            Self::NoValidValues(_) => "NO_VALID_VALUES",
            Self::Capability(_) => "CAPABILITY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for RefineryError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("RefineryError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for refinery operations.
pub type Result<T> = std::result::Result<T, RefineryError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RefineryError::Polars(e).with_context(context))
    }
}
