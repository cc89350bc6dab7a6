//! CLI entry point for the refinery pipeline.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use lex_refinery::{
    Dataset, Pipeline, PipelineConfig, PipelineResult, ReportGenerator, RunReportFile, RunStatus,
    column_types, compute_stats, detect_target_column, io,
};
use lex_refinery::utils::truncate_str;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[cfg(feature = "ai")]
use lex_refinery::capabilities::{OpenRouterConfig, OpenRouterProvider};
#[cfg(feature = "ai")]
use std::env;
#[cfg(feature = "ai")]
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Deterministic data-quality pipeline for tabular data",
    long_about = "Normalizes text and labels, fills missing values and optionally balances classes.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  OPENROUTER_API_KEY    API key for OpenRouter (enables enrichment)\n  \
                  OPENROUTER_MODEL      Model slug (default: deepseek/deepseek-chat)\n\n\
                  EXAMPLES:\n  \
                  # Clean a CSV with defaults\n  \
                  lex-refinery -i data.csv\n\n  \
                  # Balance classes on a given target, reproducibly\n  \
                  lex-refinery -i data.csv --balance --target label --seed 42\n\n  \
                  # Preview statistics and column types only\n  \
                  lex-refinery -i data.csv --dry-run\n\n  \
                  # Local-only run, machine-readable output\n  \
                  lex-refinery -i data.json --no-ai --json"
)]
struct Args {
    /// Path to the CSV or JSON file to process
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// Custom output file name (without extension)
    ///
    /// If not specified, uses the input file name
    #[arg(long)]
    output_name: Option<String>,

    /// Target column for class balancing
    ///
    /// If not specified, the pipeline will auto-detect the target
    #[arg(short, long)]
    target: Option<String>,

    /// Balance minority classes with synthetic records
    #[arg(long)]
    balance: bool,

    /// Disable text normalization
    #[arg(long)]
    no_typos: bool,

    /// Disable label normalization
    #[arg(long)]
    no_labels: bool,

    /// Disable missing value imputation
    #[arg(long)]
    no_impute: bool,

    /// Seed for synthetic record generation
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with a pipeline configuration
    ///
    /// Command-line flags override values from the file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable enrichment capabilities (local rules only)
    #[arg(long, default_value = "false")]
    no_ai: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Write a JSON report to the output directory
    ///
    /// The report will be saved as <output_name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,

    /// Print statistics and inferred column types without processing
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn output_stem(&self) -> String {
        self.output_name
            .clone()
            .unwrap_or_else(|| extract_file_stem(&self.input))
    }
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();

    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    info!("Loading dataset from: {}", args.input.display());
    let data = io::read_dataset(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    info!("Dataset loaded: {} rows x {} columns", data.len(), data.width());

    if args.dry_run {
        run_dry_run(&args, &data);
        return Ok(());
    }

    let config = build_config(&args)?;
    let pipeline = build_pipeline(&args, config)?;

    run_pipeline(&pipeline, &args, &data)
}

/// Merge the optional config file with command-line flags.
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str::<PipelineConfig>(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if args.no_typos {
        config.fix_typos = false;
    }
    if args.no_labels {
        config.normalize_labels = false;
    }
    if args.no_impute {
        config.fill_missing = false;
    }
    if args.balance {
        config.balance_classes = true;
    }
    if let Some(target) = &args.target {
        config.target_column = Some(target.clone());
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    config.validate()?;
    Ok(config)
}

/// Run dry-run mode - show statistics without processing
///
/// Note: This function uses `println!` intentionally for user-facing CLI output.
fn run_dry_run(args: &Args, data: &Dataset) {
    let stats = compute_stats(data);

    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Dataset statistics");
    println!("{}\n", "=".repeat(80));

    println!("DATASET OVERVIEW");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.input.display());
    println!("  Rows: {}", stats.total_rows);
    println!("  Columns: {}", stats.total_columns);
    println!("  Missing values: {}", stats.missing_values);
    println!("  Duplicate rows: {}", stats.duplicate_rows);
    println!();

    println!("COLUMN TYPES");
    println!("{}", "-".repeat(40));
    println!("{:<30} {:<12}", "Column", "Type");
    println!("{}", "-".repeat(42));
    for (column, column_type) in column_types(data).iter() {
        println!("{:<30} {:<12}", truncate_str(column, 29), column_type);
    }
    println!();

    println!("CLASS BALANCING");
    println!("{}", "-".repeat(40));
    match args.target.clone().or_else(|| detect_target_column(data)) {
        Some(target) => println!("  Target column: {}", target),
        None => println!("  No target column configured or detected"),
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To execute the pipeline, run without --dry-run");
    println!("{}", "=".repeat(80));
}

/// Build the pipeline with optional enrichment support
#[cfg(feature = "ai")]
fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    if args.no_ai {
        info!("Running with local rules only (enrichment disabled)");
        return build_local_pipeline(args, config);
    }

    let api_key = match env::var("OPENROUTER_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!("OPENROUTER_API_KEY not set. Running with local rules only.");
            return build_local_pipeline(args, config);
        }
    };

    let openrouter_config = match env::var("OPENROUTER_MODEL") {
        Ok(model) if !model.trim().is_empty() => OpenRouterConfig::with_model(model.trim()),
        _ => OpenRouterConfig::default(),
    };
    info!("Running with enrichment (OpenRouter, {})", openrouter_config.model);
    let provider = Arc::new(OpenRouterProvider::with_config(api_key, openrouter_config)?);

    let builder = with_progress(Pipeline::builder().config(config).capabilities(provider), args);
    Ok(builder.build()?)
}

/// Build the pipeline without enrichment support (fallback when "ai" feature is disabled)
#[cfg(not(feature = "ai"))]
fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    if !args.no_ai {
        warn!("Enrichment support not compiled in. Using local rules only.");
        warn!("Compile with --features ai to enable enrichment.");
    }
    build_local_pipeline(args, config)
}

fn build_local_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    let builder = with_progress(Pipeline::builder().config(config), args);
    Ok(builder.build()?)
}

fn with_progress(builder: lex_refinery::PipelineBuilder, args: &Args) -> lex_refinery::PipelineBuilder {
    if args.quiet || args.json {
        return builder;
    }
    builder.on_progress(|update| {
        info!(
            "[{:.0}%] {}: {}",
            update.progress * 100.0,
            update.stage.display_name(),
            update.message
        );
    })
}

/// Run pipeline, write outputs and print results
fn run_pipeline(pipeline: &Pipeline, args: &Args, data: &Dataset) -> Result<()> {
    info!("{}", "=".repeat(80));
    info!("Starting refinery pipeline...");
    info!("{}", "=".repeat(80));

    let result = pipeline.run(data);

    let stem = args.output_stem();
    let generator = ReportGenerator::new(&args.output);
    generator.ensure_output_dir()?;

    let data_path = generator.data_path(&stem);
    io::write_csv(&result.cleaned_data, &data_path)?;

    let report = RunReportFile::new(&args.input, Some(data_path.as_path()), &result);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if args.emit_report {
            let report_path = generator.write_report_to_file(&report, &stem)?;
            info!("Report written to: {}", report_path.display());
        }
        print_human_readable_summary(&result, &data_path);
    }

    match result.status {
        RunStatus::Done => Ok(()),
        RunStatus::Cancelled => Err(anyhow!("Pipeline cancelled")),
        RunStatus::Failed => {
            for entry in &result.errors {
                error!("[{}] {}", entry.kind, entry.message);
            }
            Err(anyhow!("Pipeline failed; partial results written to {}", data_path.display()))
        }
    }
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(result: &PipelineResult, data_path: &Path) {
    let initial = &result.statistics.initial;
    let final_stats = &result.statistics.final_stats;

    println!();
    println!("{}", "=".repeat(80));
    println!("REFINERY RUN: {}", format!("{:?}", result.status).to_uppercase());
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Output: {} ({} rows x {} columns)",
        data_path.display(),
        final_stats.total_rows,
        final_stats.total_columns
    );
    if let Some(target) = &result.target_column {
        println!("Target Column: {}", target);
    }
    println!();

    println!("Summary:");
    println!("  Duration: {}ms", result.duration_ms);
    println!(
        "  Rows: {} -> {} ({} synthetic)",
        initial.total_rows,
        final_stats.total_rows,
        result.synthetic_rows()
    );
    println!(
        "  Missing values: {} -> {}",
        initial.missing_values, final_stats.missing_values
    );
    println!(
        "  Duplicate rows: {} -> {}",
        initial.duplicate_rows, final_stats.duplicate_rows
    );
    println!();

    if !result.warnings.is_empty() {
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  ! [{}] {}", warning.kind, warning.message);
        }
        println!();
    }

    if !result.errors.is_empty() {
        println!("Errors:");
        for entry in &result.errors {
            println!("  x [{}] {}", entry.kind, entry.message);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save a JSON report");
    println!("{}", "=".repeat(80));
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}
