//! Lex Refinery Library
//!
//! A deterministic data-quality pipeline for tabular records, built with Rust
//! and Polars.
//!
//! # Overview
//!
//! A run takes a [`Dataset`] through up to four stages, each producing a new
//! dataset and leaving its input untouched:
//!
//! - **Text Normalization**: Dictionary typo fixes, label-case repair,
//!   whitespace, punctuation spacing and camel-case splitting
//! - **Label Normalization**: Clustering case/whitespace variants of
//!   categorical labels onto their most frequent spelling
//! - **Imputation**: Median / mode / `"Unknown"` fills per column
//! - **Class Balancing**: Synthetic minority-class records from per-class
//!   column statistics (seedable)
//!
//! Every run returns a [`PipelineResult`] with before/after statistics and a
//! report of warnings and errors. `Pipeline::run` never fails: a failing stage
//! ends the run as [`RunStatus::Failed`] with the data cleaned so far.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_refinery::{PipelineConfig, io, refine};
//! use std::path::Path;
//!
//! let dataset = io::read_csv(Path::new("data.csv"))?;
//!
//! let config = PipelineConfig::builder()
//!     .balance_classes(true)
//!     .target_column("label")
//!     .seed(42)
//!     .build()?;
//!
//! let result = refine(&dataset, config);
//!
//! println!("Status: {:?}", result.status);
//! println!("Missing: {} -> {}",
//!     result.statistics.initial.missing_values,
//!     result.statistics.final_stats.missing_values);
//! io::write_csv(&result.cleaned_data, Path::new("data_cleaned.csv"))?;
//! ```
//!
//! # Enrichment Capabilities
//!
//! Text correction, label matching and zero-shot classification can be
//! delegated to external services through the traits in [`capabilities`].
//! Calls run under a timeout/retry/concurrency policy and a failed call only
//! ever produces a warning. With the `ai` feature (default), the
//! [`capabilities::OpenRouterProvider`] implements all three.
//!
//! # Progress Reporting
//!
//! ```rust,ignore
//! use lex_refinery::{CancellationToken, Pipeline, RunStatus};
//!
//! let token = CancellationToken::new();
//! let result = Pipeline::builder()
//!     .cancellation_token(token.clone())
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .build()?
//!     .run(&dataset);
//!
//! if result.status == RunStatus::Cancelled {
//!     println!("Cancelled; {} rows processed so far", result.cleaned_data.len());
//! }
//! ```

pub mod balancer;
pub mod capabilities;
pub mod cleaner;
pub mod config;
pub mod dataset;
pub mod error;
pub mod imputers;
pub mod io;
pub mod pipeline;
pub mod profiler;
pub mod reporting;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use balancer::{Balancer, class_distribution};
pub use cleaner::{LabelNormalizer, TextNormalizer};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use dataset::{Dataset, Record, Value};
pub use error::{RefineryError, Result as RefineryResult, ResultExt};
pub use imputers::{FillStrategy, Imputer};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineState,
    ProgressReporter, ProgressUpdate, RefineryStage, StageContext, refine,
};
pub use profiler::{classify, column_types, compute_stats, detect_target_column};
pub use reporting::{ReportGenerator, RunReport, RunReportFile};
pub use types::{
    ColumnType, ColumnTypes, PipelineResult, ReportEntry, RunStatus, RunSummary, Severity,
    Statistics, Stats,
};
