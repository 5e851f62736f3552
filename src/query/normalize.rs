//! Result normalisation.
//!
//! Turns a lazily produced row sequence into a column-oriented
//! [`ResultTable`]. At most `row_cap` rows are kept; one further row is
//! pulled to learn whether the result was truncated, then dropped.

use crate::db::{BackendError, ColumnInfo, ResultTable, Row, TableColumn};
use futures::stream::{Stream, TryStreamExt};
use std::collections::HashSet;
use thiserror::Error;

/// A row whose width does not match the declared columns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row {row} has {found} values but the result declares {expected} columns")]
pub struct RowWidthError {
    pub row: usize,
    pub found: usize,
    pub expected: usize,
}

/// Failure while normalising a streamed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamFailure {
    Backend(BackendError),
    RowWidth(RowWidthError),
}

impl From<RowWidthError> for StreamFailure {
    fn from(e: RowWidthError) -> Self {
        Self::RowWidth(e)
    }
}

/// Builds a result table one row at a time.
struct TableBuilder {
    columns: Vec<TableColumn>,
    row_cap: usize,
    row_count: usize,
    truncated: bool,
}

impl TableBuilder {
    fn new(columns: &[ColumnInfo], row_cap: usize) -> Self {
        let names = unique_names(columns.iter().map(|c| c.name.as_str()));
        let columns = columns
            .iter()
            .zip(names)
            .map(|(info, name)| TableColumn {
                name,
                data_type: info.data_type.clone(),
                values: Vec::with_capacity(row_cap.min(1024)),
            })
            .collect();

        Self {
            columns,
            row_cap,
            row_count: 0,
            truncated: false,
        }
    }

    /// Adds a row. Returns `false` once the cap has been exceeded and no
    /// further rows are wanted.
    ///
    /// The lookahead row past the cap is discarded unchecked.
    fn push(&mut self, row: Row) -> Result<bool, RowWidthError> {
        if self.row_count == self.row_cap {
            self.truncated = true;
            return Ok(false);
        }

        if row.len() != self.columns.len() {
            return Err(RowWidthError {
                row: self.row_count,
                found: row.len(),
                expected: self.columns.len(),
            });
        }

        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        self.row_count += 1;
        Ok(true)
    }

    fn finish(self) -> ResultTable {
        ResultTable::assemble(self.columns, self.row_count, self.truncated)
    }
}

/// Normalises an in-memory row sequence.
///
/// The iterator is consumed lazily and never advanced past row `row_cap + 1`.
pub fn normalize<I>(columns: &[ColumnInfo], rows: I, row_cap: usize) -> Result<ResultTable, RowWidthError>
where
    I: IntoIterator<Item = Row>,
{
    let mut builder = TableBuilder::new(columns, row_cap);
    for row in rows {
        if !builder.push(row)? {
            break;
        }
    }
    Ok(builder.finish())
}

/// Normalises a streamed result, stopping after the lookahead row.
pub(crate) async fn normalize_stream<S>(
    columns: &[ColumnInfo],
    mut rows: S,
    row_cap: usize,
) -> Result<ResultTable, StreamFailure>
where
    S: Stream<Item = Result<Row, BackendError>> + Unpin,
{
    let mut builder = TableBuilder::new(columns, row_cap);
    while let Some(row) = rows.try_next().await.map_err(StreamFailure::Backend)? {
        if !builder.push(row)? {
            break;
        }
    }
    Ok(builder.finish())
}

/// Makes column names unique by suffixing repeats with `.1`, `.2`, ...
fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.to_string();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = format!("{name}.{n}");
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }

    out
}
