//! Inspection Risk Core - batch estimation and query CLI.
//!
//! Subcommands:
//! - `run`: normalize → segment → aggregate → smooth → publish
//! - `check`: validate the estimator configuration
//! - `query`: resolve a continuous estimate against a published artifact

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ir_common::{Error, OutputFormat, RunId};
use ir_config::{resolve_config, ConfigSnapshot, EstimatorConfig};
use ir_core::exit_codes::ExitCode;
use ir_core::hierarchy::HierarchyMode;
use ir_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use ir_core::pipeline::run_batch;
use ir_core::publish::{QueryOutcome, RiskQuery, RiskSnapshot};

/// Inspection Risk Core - failure-rate estimation over safety-test records
#[derive(Parser)]
#[command(name = "ir-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to estimator.json (overrides env/XDG resolution)
    #[arg(long, global = true, env = "INSPECTION_RISK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log level (trace|debug|info|warn|error|off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human|jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full batch: normalize sources, segment cycles, publish rates
    Run(RunArgs),

    /// Validate configuration and print its snapshot
    Check,

    /// Resolve an estimate for an exact mileage/age against an artifact
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Delimited source files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for cycle and segment-rate artifacts
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Use the simplified two-level hierarchy (global → segment)
    #[arg(long)]
    two_level: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Path to a segment_rates parquet artifact
    #[arg(long)]
    rates: PathBuf,

    /// Vehicle category
    #[arg(long)]
    category: String,

    /// Exact mileage
    #[arg(long)]
    mileage: f64,

    /// Exact vehicle age in years
    #[arg(long)]
    age: f64,

    #[arg(long)]
    regime: Option<String>,

    #[arg(long)]
    powertrain: Option<String>,

    #[arg(long)]
    make: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Use the simplified two-level hierarchy for fallback
    #[arg(long)]
    two_level: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_env(cli.global.log_level, cli.global.log_format));

    let code = match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(code = e.code(), category = %e.category(), "{}", e);
            eprintln!("{}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code.as_i32());
}

fn dispatch(cli: &Cli) -> Result<ExitCode, Error> {
    let (config, snapshot) = load_config(cli)?;

    match &cli.command {
        Commands::Check => {
            emit(&cli.global.format, &snapshot.to_json()?, || {
                format!(
                    "config ok: {} ({}), {} mileage bands, {} age bands",
                    snapshot.short_id(),
                    snapshot.config_source,
                    snapshot.summary.mileage_bucket_count,
                    snapshot.summary.age_bucket_count,
                )
            });
            Ok(ExitCode::Clean)
        }
        Commands::Run(args) => {
            let mode = hierarchy_mode(args.two_level);
            let (_, summary) =
                run_batch(&config, snapshot, &args.inputs, args.out_dir.as_deref(), mode)?;
            emit(&cli.global.format, &serde_json::to_string_pretty(&summary)?, || {
                format!(
                    "published {} segments (global rate {:.4}) from {} rows",
                    summary.segments_published, summary.global_rate, summary.ingest.rows_read,
                )
            });
            Ok(ExitCode::Clean)
        }
        Commands::Query(args) => {
            let rows = ir_store::read_segment_rate_rows(&args.rates)
                .map_err(|e| Error::Store(e.to_string()))?;
            let snapshot = RiskSnapshot::from_rows(
                RunId::new(),
                &config,
                snapshot,
                &rows,
                hierarchy_mode(args.two_level),
            );
            let outcome = snapshot.query(&RiskQuery {
                category: args.category.clone(),
                mileage: args.mileage,
                age_years: args.age,
                regime: args.regime.clone(),
                powertrain: args.powertrain.clone(),
                make: args.make.clone(),
                model: args.model.clone(),
            });

            emit(&cli.global.format, &serde_json::to_string_pretty(&outcome)?, || {
                match &outcome {
                    QueryOutcome::NotFound => "not found".to_string(),
                    QueryOutcome::Estimate(e) => format!(
                        "rate {:.4} [{:.4}, {:.4}] confidence {}",
                        e.rate, e.confidence.interval.lower, e.confidence.interval.upper,
                        e.confidence.label,
                    ),
                }
            });
            match outcome {
                QueryOutcome::NotFound => Ok(ExitCode::QueryNotFound),
                QueryOutcome::Estimate(_) => Ok(ExitCode::Clean),
            }
        }
    }
}

/// Resolve, load, and validate configuration; returns the config plus its
/// snapshot for the run.
fn load_config(cli: &Cli) -> Result<(EstimatorConfig, ConfigSnapshot), Error> {
    let paths = resolve_config(cli.global.config.as_deref());

    let (config, raw_json) = match &paths.estimator {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let config = EstimatorConfig::from_json(&raw)
                .map_err(|e| Error::InvalidEstimatorConfig(e.to_string()))?;
            (config, Some(raw))
        }
        None => (EstimatorConfig::default(), None),
    };

    ir_config::validate_config(&config)
        .map_err(|e| Error::InvalidEstimatorConfig(e.to_string()))?;

    let snapshot = ConfigSnapshot::new(&config, &paths, raw_json.as_deref());
    tracing::debug!(
        config = %snapshot.short_id(),
        source = %snapshot.config_source,
        "configuration loaded"
    );
    Ok((config, snapshot))
}

fn hierarchy_mode(two_level: bool) -> HierarchyMode {
    if two_level {
        HierarchyMode::TwoLevel
    } else {
        HierarchyMode::Full
    }
}

/// Print the payload on stdout in the requested format.
fn emit(format: &OutputFormat, json: &str, summary: impl FnOnce() -> String) {
    match format {
        OutputFormat::Json | OutputFormat::Jsonl => println!("{}", json),
        OutputFormat::Md => println!("```json\n{}\n```", json),
        OutputFormat::Summary => println!("{}", summary()),
    }
}

fn exit_code_for(e: &Error) -> ExitCode {
    use ir_common::ErrorCategory;
    match e.category() {
        ErrorCategory::Config => ExitCode::ConfigError,
        ErrorCategory::Ingest => ExitCode::InputError,
        ErrorCategory::Io => ExitCode::IoError,
        ErrorCategory::Segmentation | ErrorCategory::Estimation | ErrorCategory::Store => {
            ExitCode::InternalError
        }
    }
}
