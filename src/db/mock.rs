//! Mock database session for testing.
//!
//! Serves predefined columns and rows from memory. Rows are streamed lazily
//! and counted as they are pulled, so tests can check how much of a result
//! the consumer actually read.

use super::{BackendError, ColumnInfo, QuerySession, Row};
use crate::config::ExecutionBounds;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A failure the mock injects into a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// `describe` fails before any row is produced.
    Describe(BackendError),
    /// The row stream yields this many rows, then fails.
    AfterRows(usize, BackendError),
}

/// A mock session that returns predefined results.
#[derive(Debug, Default)]
pub struct MockSession {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
    tables: Vec<String>,
    failure: Option<MockFailure>,
    delay: Option<Duration>,
    applied_bounds: Vec<ExecutionBounds>,
    executed: Vec<String>,
    rows_yielded: Arc<AtomicUsize>,
}

impl MockSession {
    /// Creates a mock that answers every query with the given result.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Sets the tables reported by `list_tables`.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Injects a failure into every query.
    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Makes `describe` sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Bounds applied so far, oldest first.
    pub fn applied_bounds(&self) -> &[ExecutionBounds] {
        &self.applied_bounds
    }

    /// Statements fetched so far, oldest first.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Total number of rows pulled from all row streams.
    pub fn rows_yielded(&self) -> usize {
        self.rows_yielded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuerySession for MockSession {
    async fn apply_bounds(&mut self, bounds: &ExecutionBounds) -> Result<(), BackendError> {
        self.applied_bounds.push(*bounds);
        Ok(())
    }

    async fn describe(&mut self, _sql: &str) -> Result<Vec<ColumnInfo>, BackendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(MockFailure::Describe(err)) = &self.failure {
            return Err(err.clone());
        }
        Ok(self.columns.clone())
    }

    fn fetch<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<Row, BackendError>> {
        self.executed.push(sql.to_string());

        let fail_after = match &self.failure {
            Some(MockFailure::AfterRows(n, err)) => Some((*n, err.clone())),
            _ => None,
        };
        let counter = Arc::clone(&self.rows_yielded);
        let mut rows = self.rows.iter();
        let mut emitted = 0usize;
        let mut done = false;

        stream::iter(std::iter::from_fn(move || {
            if done {
                return None;
            }
            if let Some((n, err)) = &fail_after {
                if emitted == *n {
                    done = true;
                    return Some(Err(err.clone()));
                }
            }
            let row = rows.next()?.clone();
            emitted += 1;
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Ok(row))
        }))
        .boxed()
    }

    async fn list_tables(&mut self, limit: usize) -> Result<Vec<String>, BackendError> {
        Ok(self.tables.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;

    fn numbered(n: i64) -> Vec<Row> {
        (1..=n).map(|i| vec![Value::Int(i)]).collect()
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let mut session = MockSession::new(vec![ColumnInfo::new("n", "INT4")], numbered(100));

        let first: Vec<_> = session.fetch("SELECT n FROM t").take(3).collect().await;
        assert_eq!(first.len(), 3);
        assert_eq!(session.rows_yielded(), 3);
        assert_eq!(session.executed(), ["SELECT n FROM t".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_after_rows() {
        let mut session = MockSession::new(vec![ColumnInfo::new("n", "INT4")], numbered(10))
            .with_failure(MockFailure::AfterRows(2, BackendError::StatementTimeout));

        let items: Vec<_> = session.fetch("SELECT n FROM t").collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert_eq!(items[2], Err(BackendError::StatementTimeout));
    }

    #[tokio::test]
    async fn test_describe_failure() {
        let mut session = MockSession::default()
            .with_failure(MockFailure::Describe(BackendError::Other("nope".into())));
        assert!(session.describe("SELECT 1").await.is_err());
    }

    #[tokio::test]
    async fn test_list_tables_respects_limit() {
        let mut session = MockSession::default().with_tables(["public.a", "public.b", "public.c"]);
        assert_eq!(session.list_tables(2).await.unwrap(), vec!["public.a", "public.b"]);
    }

    #[tokio::test]
    async fn test_records_bounds() {
        let mut session = MockSession::default();
        session.apply_bounds(&ExecutionBounds::default()).await.unwrap();
        assert_eq!(session.applied_bounds(), [ExecutionBounds::default()]);
    }
}
