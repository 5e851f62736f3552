//! Query execution integration tests.
//!
//! Tests SQL query execution and result handling against PostgreSQL.

use super::{get_test_connection, get_test_session};
use iot_query_probe::config::Config;
use iot_query_probe::db::{preview_query, Value};
use iot_query_probe::query::{QueryProbe, Redactor};
use iot_query_probe::safety::Rejection;
use iot_query_probe::{ExecutionError, ProbeError};

fn query_probe() -> QueryProbe {
    let redactor = get_test_connection()
        .map(|c| Redactor::from_connection(&c))
        .unwrap_or_default();
    QueryProbe::from_config(&Config::default(), redactor).unwrap()
}

#[tokio::test]
async fn test_execute_simple_select() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run("SELECT 1 AS num, 'hello' AS greeting", &mut session)
        .await
        .unwrap();

    assert_eq!(table.column_names(), vec!["num", "greeting"]);
    assert_eq!(table.row_count(), 1);
    assert!(!table.truncated());
    assert_eq!(
        table.row(0).unwrap(),
        vec![&Value::Int(1), &Value::String("hello".to_string())]
    );

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_scalar_types() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run(
            "SELECT true AS flag, 2.5::numeric AS amount, 1.5::float8 AS ratio, \
             NULL::text AS missing, DATE '2024-03-01' AS day, \
             TIMESTAMP '2024-03-01 12:00:00' AS at, '{\"a\":1}'::jsonb AS doc",
            &mut session,
        )
        .await
        .unwrap();

    let row = table.row(0).unwrap();
    assert_eq!(row[0], &Value::Bool(true));
    assert_eq!(row[1], &Value::Float(2.5));
    assert_eq!(row[2], &Value::Float(1.5));
    assert_eq!(row[3], &Value::Null);
    assert!(matches!(row[4], Value::Date(_)));
    assert!(matches!(row[5], Value::Timestamp(_)));
    assert_eq!(row[6], &Value::String("{\"a\":1}".to_string()));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_special_values_keep_their_text() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run("SELECT 'NaN'::numeric AS n, 'infinity'::timestamp AS t", &mut session)
        .await
        .unwrap();

    assert_eq!(
        table.row(0).unwrap(),
        vec![
            &Value::String("NaN".to_string()),
            &Value::String("infinity".to_string())
        ]
    );

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run("SELECT 1 AS a, 'x' AS b WHERE false", &mut session)
        .await
        .unwrap();

    assert!(table.is_empty());
    assert_eq!(table.column_names(), vec!["a", "b"]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_column_names_are_made_unique() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = query_probe()
        .run("SELECT 1 AS v, 2 AS v", &mut session)
        .await
        .unwrap();

    assert_eq!(table.column_names(), vec!["v", "v.1"]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_syntax_error_is_database_error() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = query_probe()
        .run("SELECT * FROM no_such_table", &mut session)
        .await
        .unwrap_err();

    match err {
        ProbeError::Execution(ExecutionError::Database(message)) => {
            assert!(message.contains("no_such_table"));
        }
        other => panic!("Expected database error, got {other:?}"),
    }

    // The session stays usable after a failed statement
    let table = query_probe().run("SELECT 1", &mut session).await.unwrap();
    assert_eq!(table.row_count(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_rejected_query_is_not_sent() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = query_probe()
        .run("SELECT * FROM pg_catalog.pg_tables", &mut session)
        .await
        .unwrap_err();
    assert_eq!(err, ProbeError::Rejected(Rejection::SystemObject));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_list_tables_and_preview() {
    let Some(mut session) = get_test_session().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let probe = query_probe();
    let tables = probe.list_tables(&mut session).await.unwrap();
    assert!(tables.len() <= 100);
    assert!(tables
        .iter()
        .all(|t| !t.starts_with("pg_catalog.") && !t.starts_with("information_schema.")));

    if let Some(first) = tables.first() {
        let table = probe.run(&preview_query(first), &mut session).await.unwrap();
        assert!(table.row_count() <= 100);
    }

    session.close().await.unwrap();
}
