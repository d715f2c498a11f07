//! Row reader for the delimited flat-file source
//!
//! Loads raw records into loosely-typed string maps, preserving source row
//! order. Unknown columns survive this stage untouched; filtering against
//! the target schema happens in the transformer.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{EtlError, Result};

/// One raw source row: column name to raw string value.
pub type RawRow = HashMap<String, String>;

/// Raw rows plus the header's column set, in source order.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl SourceBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read CSV rows (header row required) from `path`, capped at `limit` rows
/// when given. Fails with [`EtlError::SourceNotFound`] when the path does
/// not exist.
pub fn read_csv_rows(path: &Path, limit: Option<usize>) -> Result<SourceBatch> {
    if !path.exists() {
        return Err(EtlError::SourceNotFound(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows: Vec<RawRow> = Vec::new();
    for record in reader.deserialize::<RawRow>() {
        rows.push(record?);
        if limit.is_some_and(|cap| rows.len() >= cap) {
            break;
        }
    }

    debug!(
        path = %path.display(),
        rows = rows.len(),
        columns = columns.len(),
        "Source file read"
    );

    Ok(SourceBatch { columns, rows })
}
