//! Database session layer.
//!
//! Provides a trait-based interface over a single database session so the
//! execution guard can be exercised against PostgreSQL or an in-memory mock.

mod mock;
mod postgres;
mod types;

pub use mock::{MockFailure, MockSession};
pub use postgres::PgSession;
pub use types::{ColumnInfo, ResultTable, Row, TableColumn, Value};

use crate::config::{ConnectionConfig, ExecutionBounds};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Maximum number of tables returned by a catalog listing.
pub const TABLE_LIST_LIMIT: usize = 100;

/// Raw failure reported by a session.
///
/// `Other` carries the backend's own text, which may include credentials;
/// it must go through redaction before leaving the query layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("canceling statement due to statement timeout")]
    StatementTimeout,
    #[error("canceling statement due to lock timeout")]
    LockTimeout,
    #[error("{0}")]
    Other(String),
}

/// Opens a PostgreSQL session for the given configuration.
pub async fn connect(config: &ConnectionConfig) -> Result<PgSession> {
    PgSession::connect(config).await
}

/// Returns the statement that previews a table in the editor.
pub fn preview_query(table: &str) -> String {
    format!("SELECT * FROM {table} LIMIT 100;")
}

/// One live database session.
///
/// Calls are strictly sequential; a session never runs two statements at once.
#[async_trait]
pub trait QuerySession: Send {
    /// Applies statement and lock timeouts for the rest of the session.
    async fn apply_bounds(&mut self, bounds: &ExecutionBounds) -> std::result::Result<(), BackendError>;

    /// Returns the result columns the statement will produce, without running it.
    async fn describe(&mut self, sql: &str) -> std::result::Result<Vec<ColumnInfo>, BackendError>;

    /// Runs the statement and streams its rows lazily.
    fn fetch<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, std::result::Result<Row, BackendError>>;

    /// Lists `schema.table` names of user tables, at most `limit` of them.
    async fn list_tables(&mut self, limit: usize) -> std::result::Result<Vec<String>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_query() {
        assert_eq!(
            preview_query("public.readings"),
            "SELECT * FROM public.readings LIMIT 100;"
        );
    }

    #[test]
    fn test_backend_error_display() {
        assert_eq!(
            BackendError::StatementTimeout.to_string(),
            "canceling statement due to statement timeout"
        );
        assert_eq!(BackendError::Other("boom".into()).to_string(), "boom");
    }
}
