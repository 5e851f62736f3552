//! Bounded execution of classified statements.
//!
//! The guard applies the statement and lock timeouts to the session, runs
//! the statement and hands the row stream to the normaliser. Backend
//! failures are mapped to [`ExecutionError`] with redacted messages.

use super::normalize::{normalize_stream, StreamFailure};
use super::redact::Redactor;
use crate::config::ExecutionBounds;
use crate::db::{BackendError, QuerySession, ResultTable};
use crate::error::{ExecutionError, ProbeError, Result};
use crate::safety::AllowedStatement;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Extra time the client waits beyond the statement timeout before giving
/// up on an unresponsive server.
pub const DEFAULT_CLIENT_GRACE: Duration = Duration::from_secs(2);

/// Runs allowed statements within fixed execution bounds.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    bounds: ExecutionBounds,
    redactor: Redactor,
    client_grace: Duration,
}

impl QueryGuard {
    /// Creates a guard with the given default bounds.
    pub fn new(bounds: ExecutionBounds, redactor: Redactor) -> Result<Self> {
        bounds.validate()?;
        Ok(Self {
            bounds,
            redactor,
            client_grace: DEFAULT_CLIENT_GRACE,
        })
    }

    /// Sets how long past the statement timeout the client keeps waiting.
    pub fn with_client_grace(mut self, grace: Duration) -> Self {
        self.client_grace = grace;
        self
    }

    /// The default bounds applied by [`execute`](Self::execute).
    pub fn bounds(&self) -> &ExecutionBounds {
        &self.bounds
    }

    /// The redactor applied to backend messages.
    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Executes a statement with the guard's default bounds.
    pub async fn execute(
        &self,
        stmt: &AllowedStatement,
        session: &mut dyn QuerySession,
    ) -> Result<ResultTable> {
        self.run(stmt, &self.bounds, session).await
    }

    /// Executes a statement with per-call bounds.
    pub async fn execute_with(
        &self,
        stmt: &AllowedStatement,
        bounds: &ExecutionBounds,
        session: &mut dyn QuerySession,
    ) -> Result<ResultTable> {
        bounds.validate()?;
        self.run(stmt, bounds, session).await
    }

    /// Lists user tables through the same bounds and redaction.
    pub async fn list_tables(
        &self,
        session: &mut dyn QuerySession,
        limit: usize,
    ) -> Result<Vec<String>> {
        session
            .apply_bounds(&self.bounds)
            .await
            .map_err(|e| self.execution_error(e))?;
        session
            .list_tables(limit)
            .await
            .map_err(|e| self.execution_error(e).into())
    }

    /// Converts a raw backend failure, redacting any message text.
    pub fn execution_error(&self, error: BackendError) -> ExecutionError {
        match error {
            BackendError::StatementTimeout => ExecutionError::Timeout,
            BackendError::LockTimeout => ExecutionError::LockTimeout,
            BackendError::Other(message) => ExecutionError::Database(self.redactor.redact(&message)),
        }
    }

    async fn run(
        &self,
        stmt: &AllowedStatement,
        bounds: &ExecutionBounds,
        session: &mut dyn QuerySession,
    ) -> Result<ResultTable> {
        let start = Instant::now();
        let sql = stmt.sql();

        let bounded = async {
            session
                .apply_bounds(bounds)
                .await
                .map_err(StreamFailure::Backend)?;
            let columns = session.describe(sql).await.map_err(StreamFailure::Backend)?;
            normalize_stream(&columns, session.fetch(sql), bounds.row_cap).await
        };

        let outcome = tokio::time::timeout(bounds.statement_timeout + self.client_grace, bounded).await;
        let execution_time = start.elapsed();

        let table = match outcome {
            Err(_) => {
                debug!("Client deadline elapsed after {:?}", execution_time);
                return Err(ExecutionError::Timeout.into());
            }
            Ok(Err(StreamFailure::Backend(e))) => return Err(self.execution_error(e).into()),
            Ok(Err(StreamFailure::RowWidth(e))) => return Err(ProbeError::internal(e.to_string())),
            Ok(Ok(table)) => table,
        };

        debug!(
            "Query returned {} rows in {:?}",
            table.row_count(),
            execution_time
        );
        if table.truncated() {
            warn!("Result truncated at row cap {}", bounds.row_cap);
        }

        Ok(table.with_execution_time(execution_time))
    }
}
