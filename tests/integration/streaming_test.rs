//! Streaming query execution integration tests.
//!
//! Tests that query execution uses bounded memory via streaming fetch
//! and that server-side limits cancel long statements.

use super::{get_test_connection, get_test_session};
use iot_query_probe::config::{Config, ExecutionBounds};
use iot_query_probe::query::{QueryProbe, Redactor};
use iot_query_probe::{ExecutionError, ProbeError};
use std::time::Duration;

fn query_probe() -> QueryProbe {
    let redactor = get_test_connection()
        .map(|c| Redactor::from_connection(&c))
        .unwrap_or_default();
    QueryProbe::from_config(&Config::default(), redactor).unwrap()
}

/// Scenario: Query with fewer rows than the row cap
/// Given a query that returns 10 rows
/// When the query runs
/// Then all rows are returned
/// And the result is not truncated
#[tokio::test]
async fn test_streaming_small_result_set() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run("SELECT g AS n FROM generate_series(1, 10) AS g", &mut session)
        .await
        .unwrap();

    assert_eq!(table.row_count(), 10);
    assert!(!table.truncated());

    session.close().await.unwrap();
}

/// Scenario: Query with more rows than the row cap
/// Given a query that returns 12,000 rows
/// When the query runs with the default row cap
/// Then exactly 10,000 rows are returned
/// And the result is marked truncated
#[tokio::test]
async fn test_streaming_large_result_set_truncated() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run(
            "SELECT g AS n, md5(g::text) AS digest FROM generate_series(1, 12000) AS g",
            &mut session,
        )
        .await
        .unwrap();

    assert_eq!(table.row_count(), 10_000);
    assert!(table.truncated());

    session.close().await.unwrap();
}

/// Scenario: Query with exactly the row cap
/// Given a query that returns exactly as many rows as the cap
/// When the query runs
/// Then the result is not truncated
#[tokio::test]
async fn test_streaming_exact_cap_not_truncated() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let bounds = ExecutionBounds {
        row_cap: 500,
        ..Default::default()
    };
    let table = query_probe()
        .run_with("SELECT g FROM generate_series(1, 500) AS g", &bounds, &mut session)
        .await
        .unwrap();

    assert_eq!(table.row_count(), 500);
    assert!(!table.truncated());

    session.close().await.unwrap();
}

/// Scenario: Query exceeding the statement timeout
/// Given a statement timeout of 500ms
/// When a query sleeps for 5 seconds
/// Then a timeout error is returned
/// And the session remains usable
#[tokio::test]
async fn test_statement_timeout_cancels_query() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let probe = query_probe();
    let bounds = ExecutionBounds {
        statement_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let result = probe
        .run_with("SELECT pg_sleep(5)", &bounds, &mut session)
        .await;

    assert_eq!(result, Err(ProbeError::Execution(ExecutionError::Timeout)));

    let table = probe.run("SELECT 1 AS alive", &mut session).await.unwrap();
    assert_eq!(table.row_count(), 1);

    session.close().await.unwrap();
}
