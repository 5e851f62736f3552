//! Output formatting for the command line.
//!
//! Provides the output formats: text table, JSON, spreadsheet, HTML report
//! and map data.

use crate::config::LimitsConfig;
use crate::db::{ResultTable, Value};
use crate::error::{ProbeError, Result};
use crate::export::{self, ChartSpec, ReportOptions};
use crate::query::FilteredTable;
use serde::Serialize;

/// Widest cell shown in the text table, in characters.
const MAX_CELL_WIDTH: usize = 40;

/// Output format of the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned plain-text table.
    #[default]
    Table,
    /// JSON with columns, rows and metadata.
    Json,
    /// `.xlsx` workbook.
    Xlsx,
    /// Printable HTML report.
    Html,
    /// Map points and viewport as JSON.
    Map,
}

impl OutputFormat {
    /// Returns true if the output is a file meant for download rather than
    /// the terminal.
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Xlsx | Self::Html)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "xlsx" => Ok(Self::Xlsx),
            "html" => Ok(Self::Html),
            "map" => Ok(Self::Map),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: table, json, xlsx, html, or map"
            )),
        }
    }
}

/// JSON output structure.
#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    columns: Vec<JsonColumn<'a>>,
    rows: Vec<Vec<&'a Value>>,
    row_count: usize,
    truncated: bool,
    filtered: bool,
    execution_time_ms: u64,
}

#[derive(Debug, Serialize)]
struct JsonColumn<'a> {
    name: &'a str,
    data_type: &'a str,
}

/// Formats query results.
#[derive(Debug, Clone)]
pub struct ResultOutput {
    format: OutputFormat,
    limits: LimitsConfig,
    report: ReportOptions,
    coordinates: (Option<String>, Option<String>),
    chart: Option<ChartSpec>,
}

impl ResultOutput {
    /// Creates a new output formatter.
    pub fn new(format: OutputFormat, limits: LimitsConfig) -> Self {
        let report = ReportOptions {
            row_cap: limits.report_row_cap,
            ..Default::default()
        };
        Self {
            format,
            limits,
            report,
            coordinates: (None, None),
            chart: None,
        }
    }

    /// Sets the report title and description.
    pub fn with_report(mut self, title: impl Into<String>, description: Option<String>) -> Self {
        self.report.title = title.into();
        self.report.description = description;
        self
    }

    /// Sets the chart drawn into the HTML report.
    pub fn with_chart(mut self, chart: Option<ChartSpec>) -> Self {
        self.chart = chart;
        self
    }

    /// Sets explicit coordinate columns for map output.
    pub fn with_coordinates(mut self, lat: Option<String>, lon: Option<String>) -> Self {
        self.coordinates = (lat, lon);
        self
    }

    /// The report options in use.
    pub fn report(&self) -> &ReportOptions {
        &self.report
    }

    /// Formats the result according to the configured format.
    pub fn render(&self, result: &FilteredTable) -> Result<Vec<u8>> {
        match self.format {
            OutputFormat::Table => Ok(format_table(result).into_bytes()),
            OutputFormat::Json => Ok(format_json(result)?.into_bytes()),
            OutputFormat::Xlsx => export::to_xlsx(&result.table, self.limits.export_row_cap),
            OutputFormat::Html => {
                let report = self.report_options(&result.table)?;
                Ok(export::build_report(&result.table, &report).into_bytes())
            }
            OutputFormat::Map => Ok(self.format_map(&result.table)?.into_bytes()),
        }
    }

    fn format_map(&self, table: &ResultTable) -> Result<String> {
        let (lat, lon) = self.coordinate_columns(table)?;
        let map = export::prepare_map(table, &lat, &lon)?
            .ok_or_else(|| ProbeError::export("No valid coordinates found"))?;
        to_pretty_json(&map)
    }

    /// Explicit coordinate columns, falling back to detected ones.
    fn coordinate_columns(&self, table: &ResultTable) -> Result<(String, String)> {
        let (detected_lat, detected_lon) = export::detect_coordinate_columns(table);
        let lat = self
            .coordinates
            .0
            .clone()
            .or(detected_lat)
            .ok_or_else(|| ProbeError::export("No latitude column found; use --lat"))?;
        let lon = self
            .coordinates
            .1
            .clone()
            .or(detected_lon)
            .ok_or_else(|| ProbeError::export("No longitude column found; use --lon"))?;
        Ok((lat, lon))
    }

    /// Report options with the chart and map sections filled in.
    fn report_options(&self, table: &ResultTable) -> Result<ReportOptions> {
        let mut report = self.report.clone();
        if let Some(spec) = &self.chart {
            let chart = export::prepare_chart(table, spec)?;
            report.chart_html = Some(export::render_chart_svg(&chart));
        }
        report.map_html = self.map_section(table)?;
        Ok(report)
    }

    /// The map section, when coordinates resolve.
    ///
    /// Detected columns without usable points leave the map out; explicitly
    /// named columns must produce one.
    fn map_section(&self, table: &ResultTable) -> Result<Option<String>> {
        let explicit = self.coordinates.0.is_some() || self.coordinates.1.is_some();
        let (lat, lon) = match self.coordinate_columns(table) {
            Ok(columns) => columns,
            Err(e) if explicit => return Err(e),
            Err(_) => return Ok(None),
        };

        match export::prepare_map(table, &lat, &lon)? {
            Some(map) => Ok(Some(export::render_map_svg(&map, &lat, &lon))),
            None if explicit => Err(ProbeError::export("No valid coordinates found")),
            None => Ok(None),
        }
    }
}

/// Formats a list of table names.
pub fn format_tables(tables: &[String], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_pretty_json(&tables),
        _ => Ok(tables.iter().map(|t| format!("{t}\n")).collect()),
    }
}

/// Formats the distinct values of a column, one per line or as a JSON array.
pub fn format_values(values: &[Value], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_pretty_json(values),
        _ => Ok(values
            .iter()
            .map(|v| format!("{}\n", v.to_display_string()))
            .collect()),
    }
}

/// Formats as an aligned plain-text table with a summary footer.
fn format_table(result: &FilteredTable) -> String {
    let table = &result.table;
    let headers: Vec<String> = table.column_names().iter().map(|n| clip(n)).collect();
    let cells: Vec<Vec<String>> = table
        .rows()
        .map(|row| row.iter().map(|v| clip(&v.to_display_string())).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    if !headers.is_empty() {
        out.push_str(&format_line(&headers, &widths));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("-+-"));
        out.push('\n');
        for row in &cells {
            out.push_str(&format_line(row, &widths));
        }
    }

    let noun = if table.row_count() == 1 { "row" } else { "rows" };
    out.push_str(&format!(
        "({} {} in {}ms)\n",
        table.row_count(),
        noun,
        table.execution_time().as_millis()
    ));
    if result.source_truncated {
        out.push_str(&format!(
            "Result truncated: the query returned more rows than the row cap{}\n",
            if result.filtered { "; filters applied to the kept rows only" } else { "" }
        ));
    }
    out
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    format!("{}\n", padded.join(" | ").trim_end())
}

fn clip(text: &str) -> String {
    let single_line = text.replace(['\n', '\r', '\t'], " ");
    match single_line.char_indices().nth(MAX_CELL_WIDTH - 1) {
        Some((cut, _)) if single_line.chars().count() > MAX_CELL_WIDTH => {
            format!("{}…", &single_line[..cut])
        }
        _ => single_line,
    }
}

/// Formats as JSON.
fn format_json(result: &FilteredTable) -> Result<String> {
    let table = &result.table;
    let output = JsonOutput {
        columns: table
            .columns()
            .iter()
            .map(|c| JsonColumn {
                name: &c.name,
                data_type: &c.data_type,
            })
            .collect(),
        rows: table.rows().collect(),
        row_count: table.row_count(),
        truncated: result.source_truncated,
        filtered: result.filtered,
        execution_time_ms: table.execution_time().as_millis() as u64,
    };
    to_pretty_json(&output)
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ProbeError::internal(format!("Failed to serialize output: {e}")))
}
