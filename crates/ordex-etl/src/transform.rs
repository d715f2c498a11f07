//! Transformer: raw source rows to validated [`OrderRecord`]s
//!
//! Pure over its inputs. Untyped string maps stop here; everything
//! downstream of this module works with `OrderRecord`.

use std::collections::HashSet;

use bigdecimal::rounding::RoundingMode;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use ordex_common::OrderRecord;

use crate::error::{EtlError, Result};
use crate::source::{RawRow, SourceBatch};

/// Columns every source batch must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["order_id", "order_date", "customer", "amount"];

/// Fields consulted by the recency filter, in priority order.
const TIMESTAMP_CANDIDATES: [&str; 3] = ["updated_at", "order_date", "created_at"];

/// Fraction digits kept on cleaned amounts.
const AMOUNT_SCALE: i64 = 2;

pub struct Transformer {
    target_columns: HashSet<String>,
    since: Option<NaiveDateTime>,
}

impl Transformer {
    /// `target_columns` is the reflected column set of the destination
    /// table; input columns outside it are dropped rather than rejected.
    pub fn new(
        target_columns: impl IntoIterator<Item = String>,
        since: Option<NaiveDateTime>,
    ) -> Self {
        Self {
            target_columns: target_columns.into_iter().collect(),
            since,
        }
    }

    /// Validate, filter and coerce a source batch.
    ///
    /// Fails with [`EtlError::Schema`] when a required column is absent from
    /// the batch's column set (checked once, not per row) and with
    /// [`EtlError::TypeCoercion`] when a key field on some row cannot be
    /// coerced. Rows whose cleaned amount is not positive are dropped
    /// silently.
    pub fn transform(&self, batch: SourceBatch) -> Result<Vec<OrderRecord>> {
        self.check_required_columns(&batch.columns)?;
        self.log_dropped_columns(&batch.columns);

        // Source row numbers (1-based, excluding the header) ride along so
        // coercion errors can point at the offending line.
        let mut rows: Vec<(usize, RawRow)> = batch
            .rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| (idx + 1, self.project(row)))
            .collect();

        if let Some(cutoff) = self.since {
            rows = apply_since_filter(rows, cutoff);
        }

        let mut records = Vec::with_capacity(rows.len());
        let mut dropped_non_positive = 0usize;
        for (row_no, row) in &rows {
            match coerce_row(*row_no, row)? {
                Some(record) => records.push(record),
                None => dropped_non_positive += 1,
            }
        }

        if dropped_non_positive > 0 {
            info!(
                dropped = dropped_non_positive,
                "Dropped rows with non-positive amounts"
            );
        }

        Ok(records)
    }

    fn check_required_columns(&self, columns: &[String]) -> Result<()> {
        let present: HashSet<&str> = columns.iter().map(String::as_str).collect();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !present.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(EtlError::Schema(format!(
                "Source is missing required columns: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn log_dropped_columns(&self, columns: &[String]) {
        let dropped: Vec<&str> = columns
            .iter()
            .map(String::as_str)
            .filter(|c| !self.target_columns.contains(*c))
            .collect();
        if !dropped.is_empty() {
            debug!(columns = ?dropped, "Dropping source columns absent from target table");
        }
    }

    /// Keep only columns present on the target table.
    fn project(&self, row: RawRow) -> RawRow {
        row.into_iter()
            .filter(|(key, _)| self.target_columns.contains(key))
            .collect()
    }
}

/// Keep rows whose best-available timestamp parses and is at or after the
/// cutoff. Rows with an absent or unparsable timestamp are dropped while the
/// filter is active.
fn apply_since_filter(
    rows: Vec<(usize, RawRow)>,
    cutoff: NaiveDateTime,
) -> Vec<(usize, RawRow)> {
    let before = rows.len();
    let kept: Vec<(usize, RawRow)> = rows
        .into_iter()
        .filter(|(_, row)| {
            TIMESTAMP_CANDIDATES
                .iter()
                .find_map(|key| {
                    row.get(*key)
                        .map(|value| value.trim())
                        .filter(|value| !value.is_empty())
                })
                .and_then(parse_timestamp)
                .map(|ts| ts >= cutoff)
                .unwrap_or(false)
        })
        .collect();
    info!(before, after = kept.len(), "Recency filter applied");
    kept
}

fn coerce_row(row_no: usize, row: &RawRow) -> Result<Option<OrderRecord>> {
    let raw_id = field(row, "order_id");
    let order_id: i64 = raw_id.parse().map_err(|e: std::num::ParseIntError| {
        EtlError::TypeCoercion {
            row: row_no,
            field: "order_id",
            value: raw_id.to_string(),
            reason: e.to_string(),
        }
    })?;

    let raw_date = field(row, "order_date");
    let order_date = parse_order_date(raw_date).ok_or_else(|| EtlError::TypeCoercion {
        row: row_no,
        field: "order_date",
        value: raw_date.to_string(),
        reason: "unrecognized date format".to_string(),
    })?;

    let customer = field(row, "customer").to_string();
    if customer.is_empty() {
        return Err(EtlError::TypeCoercion {
            row: row_no,
            field: "customer",
            value: String::new(),
            reason: "must be non-empty".to_string(),
        });
    }

    // Unparsable amounts coerce to zero and fall to the business rule below.
    let amount = parse_amount(field(row, "amount"));
    if amount <= BigDecimal::zero() {
        return Ok(None);
    }

    Ok(Some(OrderRecord {
        order_id,
        order_date,
        customer,
        amount,
    }))
}

fn field<'a>(row: &'a RawRow, key: &str) -> &'a str {
    row.get(key).map(|value| value.trim()).unwrap_or("")
}

fn parse_amount(raw: &str) -> BigDecimal {
    raw.parse::<BigDecimal>()
        .unwrap_or_else(|_| BigDecimal::zero())
        .with_scale_round(AMOUNT_SCALE, RoundingMode::HalfUp)
}

fn parse_order_date(raw: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    parse_timestamp(raw).map(|ts| ts.date())
}

/// Lenient ISO-8601-ish parsing shared by the recency filter and `--since`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
    for format in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
