//! Ordex ETL - order reconciliation loader (PostgreSQL upsert)

use std::path::PathBuf;
use std::process;

use chrono::NaiveDateTime;
use clap::Parser;
use ordex_common::logging::{init_logging, LogConfig, LogLevel};
use ordex_etl::config::EtlConfig;
use ordex_etl::pipeline::{self, RunOptions};
use ordex_etl::transform;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ordex-etl")]
#[command(author, version, about = "Order ETL loader (PostgreSQL upsert)")]
struct Cli {
    /// Path to the CSV source file (falls back to ETL_SOURCE_FILE)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Limit the number of source rows
    #[arg(short, long)]
    limit: Option<usize>,

    /// Keep only rows at or after this ISO-8601 date or timestamp
    #[arg(long, value_parser = parse_since)]
    since: Option<NaiveDateTime>,

    /// Validate and log without writing to the database
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_since(raw: &str) -> Result<NaiveDateTime, String> {
    transform::parse_timestamp(raw)
        .ok_or_else(|| format!("'{raw}' is not an ISO-8601 date or timestamp"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on the verbose flag; environment takes
    // precedence.
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let defaults = LogConfig {
        level: log_level,
        file_prefix: "ordex-etl".to_string(),
        ..LogConfig::default()
    };
    let log_config = LogConfig::from_env(defaults.clone()).unwrap_or(defaults);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config = match EtlConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("Error: {e}");
            process::exit(2);
        },
    };

    let options = RunOptions {
        source: cli.source,
        limit: cli.limit,
        since: cli.since,
        dry_run: cli.dry_run,
    };

    match pipeline::run(&config, &options).await {
        Ok(report) => {
            if report.dry_run {
                info!(
                    source_rows = report.source_rows,
                    rows = report.transformed_rows,
                    "Dry run complete"
                );
            } else {
                info!(
                    inserted = report.inserted,
                    updated = report.updated,
                    "ETL complete"
                );
            }
        },
        Err(e) => {
            error!(error = %e, "ETL failed");
            eprintln!("Error: {e}");
            process::exit(1);
        },
    }
}
