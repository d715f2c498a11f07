//! Ordex ETL Library
//!
//! Batch reconciliation of order records from a delimited flat-file source
//! into PostgreSQL.
//!
//! The pipeline is a single linear run: the source reader loads raw rows,
//! the transformer validates and coerces them into [`ordex_common::OrderRecord`]s,
//! the reconciler applies the batch with one atomic conflict-resolving
//! statement, and the run-metrics recorder persists the outcome to the
//! singleton `etl_metrics` row.
//!
//! # Example
//!
//! ```no_run
//! use ordex_etl::config::EtlConfig;
//! use ordex_etl::pipeline::{self, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> ordex_etl::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let report = pipeline::run(&config, &RunOptions::default()).await?;
//!     tracing::info!(inserted = report.inserted, updated = report.updated, "Done");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod transform;

pub use error::{EtlError, Result};
