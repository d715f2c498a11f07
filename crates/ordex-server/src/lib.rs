//! Ordex reporting server
//!
//! Read-only HTTP veneer over the tables the ETL engine writes. It never
//! mutates `orders` or `etl_metrics`; the two processes interact through
//! storage only.

pub mod config;
pub mod error;
pub mod routes;

pub use routes::{create_router, AppState};
