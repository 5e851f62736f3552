//! Query safety classification module.
//!
//! A syntactic allow-list: a submitted SQL string is either `Allowed` and
//! may be executed, or `Rejected` with the name of the first rule it broke.
//! It is not a SQL parser.

mod classifier;

pub use classifier::{classify_sql, SqlClassifier, DEFAULT_RESERVED_PREFIXES};

use std::fmt;
use thiserror::Error;

/// Reason a query was refused by the classifier.
///
/// Variants are listed in the order the rules are applied.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    #[error("empty query")]
    Empty,
    #[error("non-SELECT statement")]
    NonSelect,
    #[error("multiple statements")]
    MultipleStatements,
    #[error("comments not allowed")]
    Comments,
    #[error("system object access")]
    SystemObject,
    #[error("forbidden keyword")]
    ForbiddenKeyword,
}

impl Rejection {
    /// Returns the fixed reason string for this rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Empty => "empty query",
            Self::NonSelect => "non-SELECT statement",
            Self::MultipleStatements => "multiple statements",
            Self::Comments => "comments not allowed",
            Self::SystemObject => "system object access",
            Self::ForbiddenKeyword => "forbidden keyword",
        }
    }
}

/// A statement that passed classification.
///
/// Only the classifier can build one, so holding an `AllowedStatement` is
/// proof that the text went through every rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllowedStatement {
    sql: String,
}

impl AllowedStatement {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// The statement text, trimmed of surrounding whitespace.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for AllowedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Outcome of classifying a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed(AllowedStatement),
    Rejected(Rejection),
}

impl Verdict {
    /// Returns true if the statement may be executed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Returns the rejection, if any.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Allowed(_) => None,
            Self::Rejected(r) => Some(*r),
        }
    }

    /// Converts the verdict into a `Result` for use with `?`.
    pub fn into_result(self) -> std::result::Result<AllowedStatement, Rejection> {
        match self {
            Self::Allowed(stmt) => Ok(stmt),
            Self::Rejected(r) => Err(r),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed(_) => write!(f, "Allowed"),
            Self::Rejected(r) => write!(f, "Rejected({})", r),
        }
    }
}
