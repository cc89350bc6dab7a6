//! Imputation module for handling missing values.
//!
//! Statistical imputation only: median, mode, or a constant when a column
//! has no present values at all.

mod statistical;

pub use statistical::{FillStrategy, Imputer, UNKNOWN_FILL, fill_value};
