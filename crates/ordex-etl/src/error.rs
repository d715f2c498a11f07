//! Error types for the ETL engine
//!
//! Every failure here is fatal to the run: the error propagates to the top,
//! a FAILED outcome is recorded when the database is reachable, and the
//! process exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Failure taxonomy for one ETL run
#[derive(Error, Debug)]
pub enum EtlError {
    /// Source file does not exist
    #[error("Source file not found: '{}'. Verify the path exists and you have read permissions.", .0.display())]
    SourceNotFound(PathBuf),

    /// Required column missing from the source, or the target table/unique
    /// key column is absent
    #[error("Schema error: {0}")]
    Schema(String),

    /// A required field could not be coerced to its expected type; the run
    /// aborts rather than skipping the row
    #[error("Cannot coerce field '{field}' with value '{value}' on source row {row}: {reason}")]
    TypeCoercion {
        row: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The batch storage statement failed; all of its changes were rolled back
    #[error("Batch upsert failed and was rolled back: {0}")]
    Upsert(#[source] sqlx::Error),

    /// Storage is unreachable
    #[error("Cannot reach the database: {0}. Check DATABASE_URL and that PostgreSQL is running.")]
    Connectivity(#[source] sqlx::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source file could not be parsed as delimited text
    #[error("Failed to read source file: {0}")]
    Csv(#[from] csv::Error),

    /// File system failure while reading the source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
