//! Pipeline orchestration for one ETL run
//!
//! One run = one process invocation = one logical unit of work:
//! read source rows, transform them, apply the batch through the
//! reconciler, then persist the run outcome. All stages are sequential;
//! the only shared mutable resource touched is the database.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

use ordex_common::RunStatus;

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::metrics::RunMetricsRecorder;
use crate::reconcile::Reconciler;
use crate::source::{self, SourceBatch};
use crate::transform::Transformer;

/// Per-invocation options from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Source path; falls back to `ETL_SOURCE_FILE` when absent.
    pub source: Option<PathBuf>,
    /// Cap on the number of source rows read.
    pub limit: Option<usize>,
    /// Recency cutoff for the transformer's filter.
    pub since: Option<NaiveDateTime>,
    /// Validate and log without writing anything.
    pub dry_run: bool,
}

/// What one run did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    pub source_rows: usize,
    pub transformed_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub dry_run: bool,
}

/// Run one ETL batch end to end.
///
/// On failure after the database became reachable, a FAILED outcome is
/// recorded before the error propagates; a secondary failure while
/// recording is logged and the original error keeps priority. Dry runs
/// perform no writes at all, including the outcome row.
pub async fn run(config: &EtlConfig, options: &RunOptions) -> Result<RunReport> {
    info!(started_at = %Utc::now(), "Starting ETL");
    info!(database_url = %config.masked_database_url(), "Connecting to database");

    let pool = connect(config).await?;
    log_current_schema(&pool).await?;

    let recorder = RunMetricsRecorder::new(pool.clone());
    match execute(config, options, &pool).await {
        Ok(report) => {
            if !report.dry_run {
                recorder
                    .record_outcome(
                        Utc::now(),
                        report.inserted as i32,
                        report.updated as i32,
                        RunStatus::Ok,
                        None,
                    )
                    .await?;
            }
            Ok(report)
        },
        Err(err) => {
            // The batch is atomic, so nothing committed before the failure.
            if !options.dry_run {
                let message = err.to_string();
                if let Err(record_err) = recorder
                    .record_outcome(Utc::now(), 0, 0, RunStatus::Failed, Some(message.as_str()))
                    .await
                {
                    error!(error = %record_err, "Failed to record the FAILED outcome");
                }
            }
            Err(err)
        },
    }
}

async fn execute(config: &EtlConfig, options: &RunOptions, pool: &PgPool) -> Result<RunReport> {
    let reconciler = Reconciler::new(
        pool.clone(),
        config.table_name.clone(),
        config.unique_key.clone(),
        config.do_not_update_cols.clone(),
    );
    let target_columns = reconciler.ensure_target_schema().await?;

    let source_path = options.source.clone().or_else(|| config.source_file.clone());
    let batch = match source_path {
        Some(path) => source::read_csv_rows(&path, options.limit)?,
        None => {
            warn!("No source specified (ETL_SOURCE_FILE/--source). Proceeding with 0 rows.");
            SourceBatch::default()
        },
    };
    let source_rows = batch.len();
    info!(source_rows, "Source rows loaded");

    let records = if batch.columns.is_empty() {
        Vec::new()
    } else {
        let transformer = Transformer::new(target_columns, options.since);
        transformer.transform(batch)?
    };

    if !records.is_empty() {
        let sample =
            serde_json::to_string(&records[..records.len().min(3)]).unwrap_or_default();
        info!(sample = %sample, "Sample transformed rows");
    }

    if options.dry_run {
        info!(
            rows = records.len(),
            "Dry-run mode. No database writes will be performed"
        );
        return Ok(RunReport {
            source_rows,
            transformed_rows: records.len(),
            inserted: 0,
            updated: 0,
            dry_run: true,
        });
    }

    let counts = reconciler.apply_batch(&records).await?;

    Ok(RunReport {
        source_rows,
        transformed_rows: records.len(),
        inserted: counts.inserted,
        updated: counts.updated,
        dry_run: false,
    })
}

async fn connect(config: &EtlConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .map_err(EtlError::Connectivity)
}

async fn log_current_schema(pool: &PgPool) -> Result<()> {
    let schema: String = sqlx::query_scalar("SELECT current_schema()::text")
        .fetch_one(pool)
        .await
        .map_err(EtlError::Connectivity)?;
    info!(current_schema = %schema, "Database connection established");
    Ok(())
}
