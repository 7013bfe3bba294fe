//! EnergyZero CLI: extract, transform, validate and full pipeline runs.
//!
//! Commands:
//! - `extract`: fetch prices from the EnergyZero API and save the raw JSON
//! - `transform`: normalize a raw JSON payload into the canonical Parquet table
//! - `validate`: check a Parquet table against the canonical schema
//! - `run`: all three stages with retries, a run lock and a time budget

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use energyzero_core::data::provider::PriceQuery;
use energyzero_core::data::EnergyZeroClient;
use energyzero_core::extract::extract_to_file;
use energyzero_core::layout::manual_run_id;
use energyzero_core::transform::{resolve_input, transform_file};
use energyzero_core::validate::validate_file;
use energyzero_core::{run_pipeline, DataLayout, PipelineConfig, ValidationReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "energyzero",
    about = "EnergyZero ETL: extract, transform and validate energy prices"
)]
struct Cli {
    /// Pipeline config (TOML). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding raw/ and processed/. Overrides the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `energyzero_core=trace`). Falls back to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch energy prices and save the raw JSON response.
    Extract {
        /// Days to look back from today.
        #[arg(long)]
        days: Option<u32>,

        /// API interval code.
        #[arg(long)]
        interval: Option<u32>,

        /// API usage type code.
        #[arg(long)]
        usage_type: Option<u32>,

        /// Ask the API for VAT-inclusive prices.
        #[arg(long, default_value_t = false)]
        incl_btw: bool,

        /// HTTP timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Output file. Defaults to data/raw/energy_<timestamp>.json.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Normalize a raw JSON payload into the canonical Parquet table.
    Transform {
        /// Raw JSON file. Defaults to the newest file in data/raw/.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output file. Defaults to data/processed/energy_<timestamp>.parquet.
        #[arg(long)]
        output: Option<PathBuf>,

        /// VAT rate as a fraction (0.21 = 21%).
        #[arg(long)]
        vat_rate: Option<f64>,
    },
    /// Validate a processed Parquet table.
    Validate {
        /// Parquet file to check.
        #[arg(long)]
        input: PathBuf,
    },
    /// Run extract → transform → validate as one locked, retried run.
    Run {
        /// Days to look back from today.
        #[arg(long)]
        days: Option<u32>,

        /// VAT rate as a fraction (0.21 = 21%).
        #[arg(long)]
        vat_rate: Option<f64>,

        /// Run identifier. Defaults to manual__<UTC timestamp>.
        #[arg(long)]
        run_id: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Extract {
            days,
            interval,
            usage_type,
            incl_btw,
            timeout,
            output,
        } => {
            if let Some(days) = days {
                config.api.days = days;
            }
            if let Some(interval) = interval {
                config.api.interval = interval;
            }
            if let Some(usage_type) = usage_type {
                config.api.usage_type = usage_type;
            }
            if incl_btw {
                config.api.incl_btw = true;
            }
            if let Some(timeout) = timeout {
                config.api.timeout_secs = timeout;
            }
            config.validate()?;
            run_extract(&config, output)
        }
        Commands::Transform {
            input,
            output,
            vat_rate,
        } => {
            if let Some(vat_rate) = vat_rate {
                config.transform.vat_rate = vat_rate;
            }
            config.validate()?;
            run_transform(&config, input.as_deref(), output)
        }
        Commands::Validate { input } => run_validate(&input),
        Commands::Run {
            days,
            vat_rate,
            run_id,
        } => {
            if let Some(days) = days {
                config.api.days = days;
            }
            if let Some(vat_rate) = vat_rate {
                config.transform.vat_rate = vat_rate;
            }
            config.validate()?;
            run_full(&config, run_id)
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.paths.data_dir = dir;
    }
    Ok(config)
}

fn run_extract(config: &PipelineConfig, output: Option<PathBuf>) -> Result<()> {
    let now = Utc::now();
    let layout = DataLayout::new(&config.paths.data_dir);
    let output = output.unwrap_or_else(|| layout.timestamped_raw_path(now));

    let query = PriceQuery::from_config(&config.api, now)?;
    let client = EnergyZeroClient::new(&config.api)?;
    let outcome = extract_to_file(&client, &query, &output).context("extract failed")?;

    println!("Saved: {}", outcome.path.display());
    Ok(())
}

fn run_transform(
    config: &PipelineConfig,
    input: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let layout = DataLayout::new(&config.paths.data_dir);
    let input = resolve_input(input, &layout)?;
    let output = output.unwrap_or_else(|| layout.timestamped_processed_path(Utc::now()));

    let outcome = transform_file(&input, &output, config.transform.vat_rate)
        .with_context(|| format!("transform of {} failed", input.display()))?;

    println!(
        "Saved: {} (Rows={} Cols={})",
        outcome.output.display(),
        outcome.rows,
        outcome.columns
    );
    Ok(())
}

fn run_validate(input: &Path) -> Result<()> {
    let report = validate_file(input)
        .with_context(|| format!("validation of {} failed", input.display()))?;
    print_report(&report);
    Ok(())
}

fn run_full(config: &PipelineConfig, run_id: Option<String>) -> Result<()> {
    let now = Utc::now();
    let run_id = run_id.unwrap_or_else(|| manual_run_id(now));

    let client = EnergyZeroClient::new(&config.api)?;
    let summary = run_pipeline(config, &client, &run_id, now)
        .with_context(|| format!("pipeline run {run_id} failed"))?;

    println!();
    println!("=== Pipeline Run ===");
    println!("Run:        {}", summary.run_id);
    println!("Raw:        {}", summary.raw_path().display());
    println!("Processed:  {}", summary.processed_path().display());
    for (stage, attempts) in &summary.attempts {
        println!("{:<11} {attempts} attempt(s)", format!("{stage}:"));
    }
    print_report(&summary.report);
    Ok(())
}

fn print_report(report: &ValidationReport) {
    println!();
    println!("=== Validation ===");
    println!("File:       {}", report.path.display());
    println!("Rows:       {}", report.rows);
    println!("Columns:    {}", report.column_names.join(", "));
    if let (Some(min), Some(max)) = (&report.reading_date_min, &report.reading_date_max) {
        println!("Range:      {min} to {max}");
    }
    println!();
}
