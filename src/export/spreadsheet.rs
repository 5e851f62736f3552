//! Spreadsheet export.

use crate::db::{ResultTable, Value};
use crate::error::{ProbeError, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::{debug, warn};

/// Name of the single worksheet in an export.
pub const SHEET_NAME: &str = "Data";

/// Writes at most `row_cap` rows of the table to an `.xlsx` workbook and
/// returns its bytes.
///
/// The first row holds the column names in bold. Numbers and booleans are
/// written natively, timestamps as timezone-naive text and nulls as blanks.
pub fn to_xlsx(table: &ResultTable, row_cap: usize) -> Result<Vec<u8>> {
    if row_cap == 0 {
        return Err(ProbeError::export("export row cap must be at least 1"));
    }

    let rows = table.row_count().min(row_cap);
    if rows < table.row_count() {
        warn!(
            "Spreadsheet export limited to {} of {} rows",
            rows,
            table.row_count()
        );
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    write_sheet(worksheet, table, rows).map_err(xlsx_error)?;

    let bytes = workbook.save_to_buffer().map_err(xlsx_error)?;
    debug!("Wrote spreadsheet with {} rows ({} bytes)", rows, bytes.len());
    Ok(bytes)
}

fn write_sheet(sheet: &mut Worksheet, table: &ResultTable, rows: usize) -> std::result::Result<(), XlsxError> {
    sheet.set_name(SHEET_NAME)?;
    let header = Format::new().set_bold();

    for (col, column) in table.columns().iter().enumerate() {
        let col = u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)?;
        sheet.write_string_with_format(0, col, &column.name, &header)?;

        for (row, value) in column.values.iter().take(rows).enumerate() {
            let row = u32::try_from(row + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
            write_cell(sheet, row, col, value)?;
        }
    }

    Ok(())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> std::result::Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Int(i) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        Value::Float(f) if f.is_finite() => {
            sheet.write_number(row, col, *f)?;
        }
        Value::Timestamp(ts) => {
            sheet.write_string(row, col, ts.format("%Y-%m-%d %H:%M:%S").to_string())?;
        }
        Value::TimestampTz(ts) => {
            sheet.write_string(row, col, ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())?;
        }
        other => {
            sheet.write_string(row, col, other.to_display_string())?;
        }
    }
    Ok(())
}

fn xlsx_error(e: XlsxError) -> ProbeError {
    ProbeError::export(format!("Failed to write spreadsheet: {e}"))
}
