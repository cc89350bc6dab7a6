//! Run diagnostics and report output.
//!
//! - [`RunReport`] collects the warnings and errors of one run. It is shared
//!   by reference with every stage and is append-only.
//! - [`ReportGenerator`] writes a [`RunReportFile`] (the JSON form of a
//!   finished run) next to the cleaned dataset. Only the CLI uses it; the
//!   library core never touches the filesystem.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_refinery::reporting::{ReportGenerator, RunReportFile};
//!
//! let result = lex_refinery::refine(&dataset, config);
//! let generator = ReportGenerator::new("outputs");
//! let report = RunReportFile::new(Path::new("train.csv"), None, &result);
//! generator.write_report_to_file(&report, "train")?;
//! ```

mod generator;
mod run_report;

pub use generator::{ReportGenerator, RunReportFile};
pub use run_report::{RunReport, codes};
