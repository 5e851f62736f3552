//! Query execution pipeline.
//!
//! Ties the statement classifier to bounded execution, result
//! normalisation and error redaction, and provides client-side filtering
//! of the resulting tables.

mod filter;
mod guard;
mod normalize;
mod pipeline;
mod redact;

pub use filter::{apply_filters, distinct_values, ColumnFilter, FilteredTable, DISTINCT_VALUE_LIMIT};
pub use guard::{QueryGuard, DEFAULT_CLIENT_GRACE};
pub use normalize::{normalize, RowWidthError};
pub use pipeline::QueryProbe;
pub use redact::{Redactor, MAX_MESSAGE_CHARS, REDACTED};
