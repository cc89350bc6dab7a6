//! Optional enrichment capabilities.
//!
//! The core pipeline is fully deterministic and local. It can optionally
//! call out to external services through three narrow traits:
//!
//! - [`TextCorrector`] - free-text spelling/grammar correction
//! - [`LabelMatcher`] - semantic matching of label variants
//! - [`ZeroShotClassifier`] - assigning a label to a value
//!
//! Every call goes through a [`CapabilityRunner`], which applies a
//! [`CapabilityPolicy`] (timeout, retries with fixed backoff, bounded
//! parallelism). A failed call never fails the pipeline; the affected value
//! is left unchanged and a warning is recorded.
//!
//! # Feature Flag
//!
//! The traits and the runner are always available. The concrete
//! [`OpenRouterProvider`] requires the `ai` feature (enabled by default).
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_refinery::capabilities::OpenRouterProvider;
//! use lex_refinery::Pipeline;
//! use std::sync::Arc;
//!
//! let provider = Arc::new(OpenRouterProvider::new("your-api-key")?);
//!
//! let result = Pipeline::builder()
//!     .text_corrector(provider)
//!     .build()?
//!     .run(&dataset);
//! ```

mod provider;
mod runner;

pub use provider::{
    CapabilityError, Classification, LabelMatcher, TextCorrector, ZeroShotClassifier,
};
pub use runner::{CapabilityPolicy, CapabilityRunner};

#[cfg(feature = "ai")]
mod openrouter;

#[cfg(feature = "ai")]
pub use openrouter::{OpenRouterConfig, OpenRouterProvider};
