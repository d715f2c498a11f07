//! Run-metrics recorder: the singleton `etl_metrics` status row
//!
//! This module is the only writer of the row. Every run overwrites all
//! fields (id fixed at 1, created when absent); the reporting server and
//! operators read it back through storage.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;

use ordex_common::{RunOutcome, RunStatus};

use crate::error::{EtlError, Result};

/// Fixed id of the singleton `etl_metrics` row.
pub const METRICS_ROW_ID: i32 = 1;

pub struct RunMetricsRecorder {
    pool: PgPool,
}

impl RunMetricsRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Overwrite the singleton run-outcome row, creating it when absent.
    ///
    /// Callable on success (`RunStatus::Ok`, no message) and on failure
    /// (`RunStatus::Failed`, counts reflecting whatever committed before the
    /// failure, message populated). The persisted schema carries a single
    /// counter; the update count is logged alongside it.
    pub async fn record_outcome(
        &self,
        recorded_at: DateTime<Utc>,
        inserted: i32,
        updated: i32,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO etl_metrics \
                 (id, last_load_at, last_load_inserted, last_load_status, last_error_message) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 last_load_at = EXCLUDED.last_load_at, \
                 last_load_inserted = EXCLUDED.last_load_inserted, \
                 last_load_status = EXCLUDED.last_load_status, \
                 last_error_message = EXCLUDED.last_error_message",
        )
        .bind(METRICS_ROW_ID)
        .bind(recorded_at)
        .bind(inserted)
        .bind(status.to_string())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(EtlError::Upsert)?;

        info!(inserted, updated, status = %status, "Run outcome recorded");
        Ok(())
    }

    /// Read the singleton row back; `None` before the first run.
    pub async fn fetch_outcome(&self) -> Result<Option<RunOutcome>> {
        let row = sqlx::query(
            "SELECT last_load_at, last_load_inserted, last_load_status, last_error_message \
             FROM etl_metrics WHERE id = $1",
        )
        .bind(METRICS_ROW_ID)
        .fetch_optional(&self.pool)
        .await
        .map_err(EtlError::Connectivity)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row
            .try_get("last_load_status")
            .map_err(EtlError::Connectivity)?;
        let status: RunStatus = status
            .parse()
            .map_err(|e| EtlError::Schema(format!("etl_metrics holds an invalid status: {e}")))?;

        Ok(Some(RunOutcome {
            last_load_at: row.try_get("last_load_at").map_err(EtlError::Connectivity)?,
            last_load_inserted: row
                .try_get("last_load_inserted")
                .map_err(EtlError::Connectivity)?,
            last_load_status: status,
            last_error_message: row
                .try_get("last_error_message")
                .map_err(EtlError::Connectivity)?,
        }))
    }
}
