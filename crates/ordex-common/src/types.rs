//! Domain types shared between the ETL engine and the reporting server

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One validated business order, produced by the transformer and merged into
/// storage by the reconciler. `order_id` is the unique business key: at most
/// one persisted row exists per value, and re-ingesting the same key updates
/// that row in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub order_id: i64,
    pub order_date: NaiveDate,
    pub customer: String,
    /// Fixed-point amount, rescaled to 2 fraction digits during cleaning.
    pub amount: BigDecimal,
}

/// Terminal status of an ETL run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Ok,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "OK"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(RunStatus::Ok),
            "FAILED" => Ok(RunStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid run status: {}", s)),
        }
    }
}

/// Outcome of the most recent ETL run, persisted as the single `etl_metrics`
/// row (`id = 1`). Every run fully overwrites it; no history is retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub last_load_at: Option<DateTime<Utc>>,
    pub last_load_inserted: i32,
    pub last_load_status: RunStatus,
    pub last_error_message: Option<String>,
}
