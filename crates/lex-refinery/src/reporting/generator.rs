use crate::types::{PipelineResult, RunSummary};
use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// JSON report written next to the cleaned dataset.
///
/// Carries the run summary (status, statistics, warnings, errors) without
/// the data payloads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportFile<'a> {
    /// Timestamp when the report was generated
    pub generated_at: String,
    /// Path to the input file
    pub input_file: String,
    /// Path to the cleaned output file, if one was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(flatten)]
    pub summary: RunSummary<'a>,
}

impl<'a> RunReportFile<'a> {
    pub fn new(input_file: &Path, output_file: Option<&Path>, result: &'a PipelineResult) -> Self {
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_file: input_file.display().to_string(),
            output_file: output_file.map(|p| p.display().to_string()),
            summary: result.summary(),
        }
    }
}

/// Writes cleaned datasets and their reports into an output directory.
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the cleaned CSV for a given output stem.
    pub fn data_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}_cleaned.csv", stem))
    }

    /// Path of the JSON report for a given output stem.
    pub fn report_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}_report.json", stem))
    }

    /// Create the output directory if needed.
    pub fn ensure_output_dir(&self) -> Result<()> {
        if !self.output_dir.exists() {
            debug!("Creating output directory {}", self.output_dir.display());
            fs::create_dir_all(&self.output_dir)?;
        }
        Ok(())
    }

    /// Serialize `report` as pretty JSON to `<stem>_report.json`.
    pub fn write_report_to_file(&self, report: &RunReportFile<'_>, stem: &str) -> Result<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.report_path(stem);
        let json = serde_json::to_string_pretty(report)?;
        let mut file = File::create(&path)?;
        file.write_all(json.as_bytes())?;
        info!("Report written to {}", path.display());
        Ok(path)
    }
}
