//! Reconciler: conflict-resolving batch upsert against the target table
//!
//! Each batch is applied with a single set-based
//! `INSERT ... ON CONFLICT (order_id) DO UPDATE` statement inside one
//! transaction: either every row commits or none do. The statement's
//! `RETURNING (xmax = 0)` column tells, per affected row, whether the row
//! version existed before the statement, which is how rows are classified
//! as inserted vs updated without a second round trip.
//!
//! Concurrent runs against the same table stay duplicate-free through the
//! conflict resolution, but insert/update attribution between interleaved
//! runs is not guaranteed stable.

use std::collections::HashSet;

use sqlx::{PgPool, Row};
use tracing::{debug, info};

use ordex_common::OrderRecord;

use crate::error::{EtlError, Result};

/// Columns the reconciler writes, in statement order.
const INSERT_COLUMNS: [&str; 4] = ["order_id", "order_date", "customer", "amount"];

/// Per-batch insert/update tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

pub struct Reconciler {
    pool: PgPool,
    table: String,
    unique_key: String,
    do_not_update: HashSet<String>,
}

impl Reconciler {
    pub fn new(
        pool: PgPool,
        table: String,
        unique_key: String,
        do_not_update: HashSet<String>,
    ) -> Self {
        Self {
            pool,
            table,
            unique_key,
            do_not_update,
        }
    }

    /// Reflect the target table's column set and verify the unique-key
    /// column exists. Runs once at startup, before any row processing.
    pub async fn ensure_target_schema(&self) -> Result<Vec<String>> {
        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await
        .map_err(EtlError::Connectivity)?;

        if columns.is_empty() {
            return Err(EtlError::Schema(format!(
                "Table '{}' not found. Did you run migrations?",
                self.table
            )));
        }
        if !columns.iter().any(|c| c == &self.unique_key) {
            return Err(EtlError::Schema(format!(
                "Unique key column '{}' does not exist in table '{}'",
                self.unique_key, self.table
            )));
        }

        debug!(table = %self.table, columns = columns.len(), "Target schema reflected");
        Ok(columns)
    }

    /// Apply one batch atomically and classify every affected row.
    ///
    /// An empty batch returns zero counts without opening a transaction.
    /// On statement failure the transaction rolls back, the counts are
    /// discarded and the cause surfaces as [`EtlError::Upsert`].
    pub async fn apply_batch(&self, records: &[OrderRecord]) -> Result<UpsertCounts> {
        if records.is_empty() {
            info!("Empty batch, skipping upsert");
            return Ok(UpsertCounts::default());
        }

        let sql = build_upsert_sql(
            &self.table,
            &self.unique_key,
            &self.do_not_update,
            records.len(),
        )?;

        let mut query = sqlx::query(&sql);
        for record in records {
            query = query
                .bind(record.order_id)
                .bind(record.order_date)
                .bind(&record.customer)
                .bind(&record.amount);
        }

        let mut tx = self.pool.begin().await.map_err(EtlError::Upsert)?;
        let returned = query.fetch_all(&mut *tx).await.map_err(EtlError::Upsert)?;

        let mut counts = UpsertCounts::default();
        for row in &returned {
            let freshly_inserted: bool = row.try_get("inserted").map_err(EtlError::Upsert)?;
            if freshly_inserted {
                counts.inserted += 1;
            } else {
                counts.updated += 1;
            }
        }

        tx.commit().await.map_err(EtlError::Upsert)?;

        info!(
            inserted = counts.inserted,
            updated = counts.updated,
            "Upsert complete"
        );
        Ok(counts)
    }
}

/// Build the multi-row conflict-resolving insert. Every inserted column is
/// updated on conflict except the unique key and the do-not-update set.
fn build_upsert_sql(
    table: &str,
    unique_key: &str,
    do_not_update: &HashSet<String>,
    row_count: usize,
) -> Result<String> {
    let width = INSERT_COLUMNS.len();
    let mut value_rows = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let params: Vec<String> = (1..=width)
            .map(|col| format!("${}", row * width + col))
            .collect();
        value_rows.push(format!("({})", params.join(", ")));
    }

    let update_cols: Vec<String> = INSERT_COLUMNS
        .iter()
        .filter(|col| **col != unique_key && !do_not_update.contains(**col))
        .map(|col| format!("{col} = EXCLUDED.{col}"))
        .collect();
    if update_cols.is_empty() {
        return Err(EtlError::Config(format!(
            "DO_NOT_UPDATE_COLS excludes every updatable column of '{table}'"
        )));
    }

    Ok(format!(
        "INSERT INTO {table} ({columns}) VALUES {values} \
         ON CONFLICT ({unique_key}) DO UPDATE SET {updates} \
         RETURNING (xmax = 0) AS inserted",
        columns = INSERT_COLUMNS.join(", "),
        values = value_rows.join(", "),
        updates = update_cols.join(", "),
    ))
}
