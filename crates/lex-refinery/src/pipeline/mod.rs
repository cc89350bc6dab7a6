//! Pipeline module.
//!
//! This module provides the refinery pipeline, its stages and the progress
//! and cancellation plumbing shared by all of them.

mod builder;
mod context;
pub mod progress;
mod stage;

pub use builder::{Pipeline, PipelineBuilder, refine};
pub use context::StageContext;
pub use progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate, RefineryStage,
};
pub use stage::{BalanceStage, PipelineState, Stage};
