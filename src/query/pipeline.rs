//! Classify, execute and normalise in one call.

use super::guard::QueryGuard;
use super::redact::Redactor;
use crate::config::{Config, ExecutionBounds};
use crate::db::{QuerySession, ResultTable, TABLE_LIST_LIMIT};
use crate::error::Result;
use crate::safety::{SqlClassifier, Verdict};
use tracing::info;

/// The full query path: statement classifier followed by the execution guard.
///
/// A rejected query returns before the session is touched.
#[derive(Debug, Clone)]
pub struct QueryProbe {
    classifier: SqlClassifier,
    guard: QueryGuard,
}

impl QueryProbe {
    /// Creates a probe from its two stages.
    pub fn new(classifier: SqlClassifier, guard: QueryGuard) -> Self {
        Self { classifier, guard }
    }

    /// Builds a probe from configured limits and reserved prefixes.
    pub fn from_config(config: &Config, redactor: Redactor) -> Result<Self> {
        let bounds = config.limits.execution_bounds()?;
        let classifier = SqlClassifier::with_reserved_prefixes(&config.safety.reserved_prefixes);
        Ok(Self::new(classifier, QueryGuard::new(bounds, redactor)?))
    }

    /// The execution guard.
    pub fn guard(&self) -> &QueryGuard {
        &self.guard
    }

    /// Classifies a query without running it.
    pub fn classify(&self, sql: &str) -> Verdict {
        self.classifier.classify(sql)
    }

    /// Classifies and runs a query with the default bounds.
    pub async fn run(&self, sql: &str, session: &mut dyn QuerySession) -> Result<ResultTable> {
        let bounds = *self.guard.bounds();
        self.run_with(sql, &bounds, session).await
    }

    /// Classifies and runs a query with per-call bounds.
    pub async fn run_with(
        &self,
        sql: &str,
        bounds: &ExecutionBounds,
        session: &mut dyn QuerySession,
    ) -> Result<ResultTable> {
        let stmt = match self.classify(sql) {
            Verdict::Allowed(stmt) => stmt,
            Verdict::Rejected(reason) => {
                info!("Query rejected: {}", reason);
                return Err(reason.into());
            }
        };
        self.guard.execute_with(&stmt, bounds, session).await
    }

    /// Lists user tables, at most [`TABLE_LIST_LIMIT`].
    pub async fn list_tables(&self, session: &mut dyn QuerySession) -> Result<Vec<String>> {
        self.guard.list_tables(session, TABLE_LIST_LIMIT).await
    }
}
