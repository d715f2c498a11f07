//! End-to-end pipeline tests: CSV source through transform and upsert
//!
//! Skipped with a notice when `DATABASE_URL` is unset.

use std::collections::HashSet;
use std::io::Write;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use ordex_common::RunStatus;
use ordex_etl::config::EtlConfig;
use ordex_etl::pipeline::{self, RunOptions};
use ordex_etl::EtlError;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tempfile::NamedTempFile;

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    sqlx::query("TRUNCATE orders, etl_metrics")
        .execute(&pool)
        .await
        .expect("truncate tables");
    Some(pool)
}

fn test_config() -> EtlConfig {
    EtlConfig {
        database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
        table_name: "orders".to_string(),
        unique_key: "order_id".to_string(),
        do_not_update_cols: HashSet::from(["created_at".to_string()]),
        source_file: None,
        connect_timeout_secs: 10,
    }
}

fn write_source(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[tokio::test]
#[serial]
async fn test_full_run_loads_and_records_outcome() {
    let Some(pool) = test_pool().await else { return };
    let source = write_source(
        "order_id,order_date,customer,amount,warehouse\n\
         1,2025-10-01,Alice,100,north\n\
         2,2025-10-02,Bob,0,south\n\
         3,2025-10-03,Carol,49.99,east\n",
    );

    let options = RunOptions {
        source: Some(source.path().to_path_buf()),
        ..RunOptions::default()
    };
    let report = pipeline::run(&test_config(), &options).await.expect("run");

    assert_eq!(report.source_rows, 3);
    // Bob's zero-amount row is dropped by the business rule.
    assert_eq!(report.transformed_rows, 2);
    assert_eq!((report.inserted, report.updated), (2, 0));

    let total: BigDecimal = sqlx::query_scalar("SELECT SUM(amount) FROM orders")
        .fetch_one(&pool)
        .await
        .expect("sum");
    assert_eq!(total, BigDecimal::from_str("149.99").expect("valid amount"));

    let status: String =
        sqlx::query_scalar("SELECT last_load_status FROM etl_metrics WHERE id = 1")
            .fetch_one(&pool)
            .await
            .expect("status");
    assert_eq!(status, RunStatus::Ok.to_string());
}

#[tokio::test]
#[serial]
async fn test_dry_run_writes_nothing() {
    let Some(pool) = test_pool().await else { return };
    let source = write_source(
        "order_id,order_date,customer,amount\n\
         1,2025-10-01,Alice,100\n",
    );

    let options = RunOptions {
        source: Some(source.path().to_path_buf()),
        dry_run: true,
        ..RunOptions::default()
    };
    let report = pipeline::run(&test_config(), &options).await.expect("run");
    assert!(report.dry_run);
    assert_eq!(report.transformed_rows, 1);

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(orders, 0);

    let metrics: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM etl_metrics")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(metrics, 0);
}

#[tokio::test]
#[serial]
async fn test_missing_source_records_failed_outcome() {
    let Some(pool) = test_pool().await else { return };

    let options = RunOptions {
        source: Some("/nonexistent/orders.csv".into()),
        ..RunOptions::default()
    };
    let err = pipeline::run(&test_config(), &options).await.unwrap_err();
    assert!(matches!(err, EtlError::SourceNotFound(_)));

    let (status, message): (String, Option<String>) = sqlx::query_as(
        "SELECT last_load_status, last_error_message FROM etl_metrics WHERE id = 1",
    )
    .fetch_one(&pool)
    .await
    .expect("outcome row");
    assert_eq!(status, RunStatus::Failed.to_string());
    assert!(message.unwrap_or_default().contains("Source file not found"));
}

#[tokio::test]
#[serial]
async fn test_limit_and_since_narrow_the_batch() {
    let Some(pool) = test_pool().await else { return };
    let source = write_source(
        "order_id,order_date,customer,amount\n\
         1,2025-10-01,Alice,10\n\
         2,2025-10-02,Bob,20\n\
         3,2025-10-03,Carol,30\n\
         4,2025-10-04,Dave,40\n",
    );

    let options = RunOptions {
        source: Some(source.path().to_path_buf()),
        limit: Some(3),
        since: ordex_etl::transform::parse_timestamp("2025-10-02"),
        ..RunOptions::default()
    };
    let report = pipeline::run(&test_config(), &options).await.expect("run");

    // The cap reads rows 1..=3, the recency cutoff then keeps 2 and 3.
    assert_eq!(report.source_rows, 3);
    assert_eq!(report.transformed_rows, 2);
    assert_eq!(report.inserted, 2);

    let ids: Vec<i64> = sqlx::query_scalar("SELECT order_id FROM orders ORDER BY order_id")
        .fetch_all(&pool)
        .await
        .expect("ids");
    assert_eq!(ids, vec![2, 3]);
}
