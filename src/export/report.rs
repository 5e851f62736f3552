//! Printable HTML report.
//!
//! Builds a standalone, print-friendly page: a header with title,
//! generation time and row count, a row-capped data table, and optional
//! chart and map sections supplied by the caller as ready-made markup.

use crate::config::DEFAULT_REPORT_ROW_CAP;
use crate::db::{ResultTable, Value};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// Title used when none is given.
pub const DEFAULT_REPORT_TITLE: &str = "Data Report";

/// Maximum length of a report file stem, in characters.
pub const MAX_FILE_STEM_CHARS: usize = 50;

const REPORT_STYLE: &str = r#"
        body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; font-size: 11px; padding: 15px; margin: 0; background: #fff; color: #000; }
        h1 { font-size: 16px; margin: 0 0 5px 0; }
        h2 { font-size: 13px; margin: 10px 0 8px 0; padding-bottom: 5px; border-bottom: 1px solid #ddd; }
        .header { page-break-after: avoid; }
        .meta { color: #333; margin-bottom: 5px; }
        .description { margin-bottom: 10px; padding: 8px; background: #f9f9f9; border-left: 3px solid #ddd; }
        table { width: 100%; border-collapse: collapse; font-size: 10px; }
        th, td { padding: 4px 6px; border: 1px solid #ddd; text-align: left; }
        th { background: #f5f5f5; font-weight: 600; }
        tr:nth-child(even) { background: #fafafa; }
        thead { display: table-header-group; }
        tr { page-break-inside: avoid; }
        .section { margin: 15px 0; }
        .section-chart, .section-map { page-break-inside: avoid; page-break-before: auto; }
        @media print {
            body { font-size: 9px; padding: 0; }
            table { font-size: 8px; }
            h2 { page-break-after: avoid; }
        }
        @page { margin: 1cm; size: A4 landscape; }
"#;

/// Content and limits of an HTML report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub title: String,
    pub description: Option<String>,
    /// Chart markup, inserted verbatim.
    pub chart_html: Option<String>,
    /// Map markup, inserted verbatim.
    pub map_html: Option<String>,
    /// Maximum number of rows rendered into the data table.
    pub row_cap: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_REPORT_TITLE.to_string(),
            description: None,
            chart_html: None,
            map_html: None,
            row_cap: DEFAULT_REPORT_ROW_CAP,
        }
    }
}

/// Renders a report stamped with the current time.
pub fn build_report(table: &ResultTable, options: &ReportOptions) -> String {
    render_report(table, options, Utc::now())
}

/// Renders a report stamped with `generated_at`.
pub fn render_report(table: &ResultTable, options: &ReportOptions, generated_at: DateTime<Utc>) -> String {
    let title = if options.title.trim().is_empty() {
        DEFAULT_REPORT_TITLE
    } else {
        options.title.as_str()
    };
    let title = escape_html(title);

    let description = options
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!(r#"<div class="description">{}</div>"#, escape_html(d)))
        .unwrap_or_default();

    let chart = options
        .chart_html
        .as_deref()
        .map(|html| format!(r#"<div class="section section-chart"><h2>Chart</h2>{html}</div>"#))
        .unwrap_or_default();

    let map = options
        .map_html
        .as_deref()
        .map(|html| format!(r#"<div class="section section-map"><h2>Map</h2>{html}</div>"#))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
    <div class="header">
        <h1>{title}</h1>
        <div class="meta">Generated: {generated} | Rows: {rows}</div>
        {description}
    </div>
    <div class="section"><h2>Data</h2>{table}</div>
    {chart}
    {map}
</body>
</html>"#,
        style = REPORT_STYLE,
        generated = generated_at.format("%Y-%m-%d %H:%M UTC"),
        rows = format_thousands(table.row_count()),
        table = render_table(table, options.row_cap),
    )
}

fn render_table(table: &ResultTable, row_cap: usize) -> String {
    let mut html = String::from("<table><thead><tr>");
    for name in table.column_names() {
        let _ = write!(html, "<th>{}</th>", escape_html(name));
    }
    html.push_str("</tr></thead><tbody>");

    for row in table.rows().take(row_cap) {
        html.push_str("<tr>");
        for value in row {
            let _ = write!(html, "<td>{}</td>", escape_html(&cell_text(value)));
        }
        html.push_str("</tr>");
    }

    html.push_str("</tbody></table>");
    html
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_display_string(),
    }
}

/// Escapes text for use in HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Formats a count with comma thousands separators.
pub fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Turns a report name into a safe file stem.
///
/// Keeps ASCII letters, digits, `-` and `_`; spaces and every other
/// character become `_`. The result is cut to 50 characters and falls
/// back to `report` when nothing usable remains.
pub fn report_file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_STEM_CHARS)
        .collect();

    if stem.chars().all(|c| c == '_') {
        "report".to_string()
    } else {
        stem
    }
}

/// Builds `<stem>_<YYYYmmdd_HHMMSS>.<extension>`.
pub fn timestamped_file_name(stem: &str, extension: &str, at: DateTime<Utc>) -> String {
    format!("{stem}_{}.{extension}", at.format("%Y%m%d_%H%M%S"))
}
