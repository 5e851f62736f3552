//! Error types for the query probe.
//!
//! `ProbeError` is the single error type surfaced to callers. Execution
//! failures carry an `ExecutionError` whose messages have already been
//! redacted by the execution guard.

use thiserror::Error;

use crate::safety::Rejection;

/// Main error type for query probe operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The statement classifier refused the query; the database was never touched.
    #[error("Query rejected: {0}")]
    Rejected(#[from] Rejection),

    /// The query was sent to the database and failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors (invalid config file, out-of-range limits, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Spreadsheet or report generation errors.
    #[error("Export error: {0}")]
    Export(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an export error with the given message.
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "Rejected Query",
            Self::Execution(e) => e.kind().label(),
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Export(_) => "Export Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Failure of a permitted statement while running against the database.
///
/// The `Database` message is always the redacted form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The statement ran past the statement timeout.
    #[error("Query exceeded the statement timeout")]
    Timeout,

    /// The statement waited on a lock past the lock timeout.
    #[error("Query exceeded the lock timeout while waiting for a lock")]
    LockTimeout,

    /// Any other backend failure (syntax, permission, connectivity).
    #[error("Database error: {0}")]
    Database(String),
}

/// Discriminant of an [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionErrorKind {
    Timeout,
    LockTimeout,
    Database,
}

impl ExecutionErrorKind {
    /// Display label for the kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "Query Timeout",
            Self::LockTimeout => "Lock Timeout",
            Self::Database => "Database Error",
        }
    }
}

impl ExecutionError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            Self::Timeout => ExecutionErrorKind::Timeout,
            Self::LockTimeout => ExecutionErrorKind::LockTimeout,
            Self::Database(_) => ExecutionErrorKind::Database,
        }
    }

    /// Returns the (redacted) backend message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Database(msg) => Some(msg),
            Self::Timeout | Self::LockTimeout => None,
        }
    }
}

/// Result type alias using ProbeError.
pub type Result<T> = std::result::Result<T, ProbeError>;
