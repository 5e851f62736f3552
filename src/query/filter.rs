//! Client-side filtering of result tables.
//!
//! Filters never go back to the database; they select rows of a table
//! that has already been fetched and capped.

use crate::db::{ResultTable, Value};
use crate::error::{ProbeError, Result};
use std::collections::HashSet;

/// Maximum number of distinct values offered as filter choices.
pub const DISTINCT_VALUE_LIMIT: usize = 50;

/// Restricts one column to a set of allowed values.
///
/// Values are compared by their display form, so `"3"` matches an integer 3.
/// An empty allowed set places no restriction on the column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub allowed: Vec<String>,
}

impl ColumnFilter {
    /// Creates a filter for the given column and allowed values.
    pub fn new<I, S>(column: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Groups `(column, value)` pairs into one filter per column, in
    /// first-seen column order.
    pub fn from_pairs<I>(pairs: I) -> Vec<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut filters: Vec<Self> = Vec::new();
        for (column, value) in pairs {
            match filters.iter_mut().find(|f| f.column == column) {
                Some(filter) => {
                    if !filter.allowed.contains(&value) {
                        filter.allowed.push(value);
                    }
                }
                None => filters.push(Self::new(column, [value])),
            }
        }
        filters
    }

    /// Returns true if the filter restricts anything.
    pub fn is_active(&self) -> bool {
        !self.allowed.is_empty()
    }

    fn matches(&self, value: &Value) -> bool {
        let shown = value.to_display_string();
        self.allowed.iter().any(|a| *a == shown)
    }
}

/// A table after client-side filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredTable {
    /// The rows that passed every filter.
    pub table: ResultTable,
    /// True if at least one active filter was applied.
    pub filtered: bool,
    /// True if the table being filtered was itself truncated by the row cap.
    pub source_truncated: bool,
}

impl FilteredTable {
    /// Number of rows after filtering.
    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }
}

/// Keeps the rows whose value in every filtered column is allowed.
///
/// Fails if a filter names a column the table does not have.
pub fn apply_filters(table: &ResultTable, filters: &[ColumnFilter]) -> Result<FilteredTable> {
    let mut active = Vec::with_capacity(filters.len());
    for filter in filters {
        let index = table
            .column_index(&filter.column)
            .ok_or_else(|| ProbeError::config(format!("Unknown filter column '{}'", filter.column)))?;
        if filter.is_active() {
            active.push((index, filter));
        }
    }

    if active.is_empty() {
        return Ok(FilteredTable {
            table: table.clone(),
            filtered: false,
            source_truncated: table.truncated(),
        });
    }

    let columns = table.columns();
    let kept = table.retain_rows(|row| {
        active
            .iter()
            .all(|(index, filter)| filter.matches(&columns[*index].values[row]))
    });

    Ok(FilteredTable {
        table: kept,
        filtered: true,
        source_truncated: table.truncated(),
    })
}

/// Returns up to `limit` distinct non-null values of a column, in
/// first-seen order.
pub fn distinct_values(table: &ResultTable, column: &str, limit: usize) -> Result<Vec<Value>> {
    let column = table
        .column(column)
        .ok_or_else(|| ProbeError::config(format!("Unknown column '{column}'")))?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in &column.values {
        if out.len() == limit {
            break;
        }
        if value.is_null() {
            continue;
        }
        if seen.insert(value.to_display_string()) {
            out.push(value.clone());
        }
    }
    Ok(out)
}
