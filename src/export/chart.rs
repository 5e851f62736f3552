//! Line charts for the HTML report.
//!
//! Plots one column against another as inline SVG, with one line per value
//! of an optional colour-by column. Rows are drawn in result order.

use super::report::escape_html;
use crate::db::{ResultTable, Value};
use crate::error::{ProbeError, Result};
use std::fmt::Write;

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 360.0;
const MARGIN_LEFT: f64 = 72.0;
const MARGIN_RIGHT: f64 = 160.0;
const MARGIN_TOP: f64 = 32.0;
const MARGIN_BOTTOM: f64 = 40.0;

const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Columns chosen for a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSpec {
    pub x: String,
    pub y: String,
    /// Draws one line per distinct value of this column.
    pub color: Option<String>,
}

impl ChartSpec {
    pub fn new(x: impl Into<String>, y: impl Into<String>, color: Option<String>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            color,
        }
    }

    /// Chart title, `"<y> over <x>"`.
    pub fn title(&self) -> String {
        format!("{} over {}", self.y, self.x)
    }
}

/// One plotted line.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Colour-by value, or `None` for an uncoloured chart.
    pub name: Option<String>,
    pub points: Vec<(f64, f64)>,
}

/// Points ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Labels shown at the ends of the x-axis.
    pub x_range: (String, String),
    pub series: Vec<Series>,
}

/// Collects chart points from a table.
///
/// Numeric and temporal x values are placed by value; any other x column is
/// treated as categories in first-seen order. Rows with a null x or a
/// non-numeric y are skipped.
pub fn prepare_chart(table: &ResultTable, spec: &ChartSpec) -> Result<ChartData> {
    let x_column = column(table, &spec.x)?;
    let y_column = column(table, &spec.y)?;
    let color_column = spec
        .color
        .as_deref()
        .map(|name| column(table, name))
        .transpose()?;

    let numeric_x = x_column
        .iter()
        .filter(|v| !v.is_null())
        .all(|v| axis_number(v).is_some());
    let mut categories: Vec<String> = Vec::new();

    let mut series: Vec<Series> = Vec::new();
    let mut x_ends: Option<((f64, String), (f64, String))> = None;

    for (row, (x, y)) in x_column.iter().zip(y_column).enumerate() {
        let Some(y) = y.as_f64() else { continue };
        if x.is_null() {
            continue;
        }

        let x_pos = if numeric_x {
            match axis_number(x) {
                Some(pos) => pos,
                None => continue,
            }
        } else {
            let label = x.to_display_string();
            match categories.iter().position(|c| *c == label) {
                Some(i) => i as f64,
                None => {
                    categories.push(label);
                    (categories.len() - 1) as f64
                }
            }
        };

        if numeric_x {
            let label = x.to_display_string();
            x_ends = Some(match x_ends {
                None => ((x_pos, label.clone()), (x_pos, label)),
                Some((lo, hi)) => (
                    if x_pos < lo.0 { (x_pos, label.clone()) } else { lo },
                    if x_pos > hi.0 { (x_pos, label) } else { hi },
                ),
            });
        }

        let name = color_column.map(|values| values[row].to_display_string());
        match series.iter_mut().find(|s| s.name == name) {
            Some(s) => s.points.push((x_pos, y)),
            None => series.push(Series {
                name,
                points: vec![(x_pos, y)],
            }),
        }
    }

    if series.is_empty() {
        return Err(ProbeError::export(format!(
            "No rows with a value for '{}' and a number for '{}'",
            spec.x, spec.y
        )));
    }

    let x_range = match x_ends {
        Some(((_, lo), (_, hi))) => (lo, hi),
        None => (
            categories.first().cloned().unwrap_or_default(),
            categories.last().cloned().unwrap_or_default(),
        ),
    };

    Ok(ChartData {
        title: spec.title(),
        x_label: spec.x.clone(),
        y_label: spec.y.clone(),
        x_range,
        series,
    })
}

fn column<'a>(table: &'a ResultTable, name: &str) -> Result<&'a [Value]> {
    table
        .column(name)
        .map(|c| c.values.as_slice())
        .ok_or_else(|| ProbeError::config(format!("Unknown chart column '{name}'")))
}

/// Position of a value on a continuous axis.
fn axis_number(value: &Value) -> Option<f64> {
    match value {
        Value::Timestamp(ts) => Some(ts.and_utc().timestamp() as f64),
        Value::TimestampTz(ts) => Some(ts.timestamp() as f64),
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp() as f64),
        other => other.as_f64(),
    }
}

/// Renders the chart as a standalone SVG element.
pub fn render_chart_svg(chart: &ChartData) -> String {
    let points = chart.series.iter().flat_map(|s| s.points.iter());
    let (x_min, x_max) = span(points.clone().map(|p| p.0));
    let (y_min, y_max) = span(points.map(|p| p.1));

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let sx = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_w;
    let sy = |y: f64| MARGIN_TOP + (y_max - y) / (y_max - y_min) * plot_h;
    let bottom = MARGIN_TOP + plot_h;
    let right = MARGIN_LEFT + plot_w;

    let mut svg = format!(
        r#"<svg class="chart" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {WIDTH} {HEIGHT}" width="100%" role="img">"#
    );
    let _ = write!(
        svg,
        r#"<title>{title}</title><text x="{MARGIN_LEFT}" y="20" font-size="14" font-weight="bold">{title}</text>"#,
        title = escape_html(&chart.title)
    );
    let _ = write!(
        svg,
        "<line x1=\"{MARGIN_LEFT}\" y1=\"{bottom}\" x2=\"{right}\" y2=\"{bottom}\" stroke=\"#333\"/>\
         <line x1=\"{MARGIN_LEFT}\" y1=\"{MARGIN_TOP}\" x2=\"{MARGIN_LEFT}\" y2=\"{bottom}\" stroke=\"#333\"/>"
    );

    let label_y = bottom + 16.0;
    let _ = write!(
        svg,
        r#"<text x="{MARGIN_LEFT}" y="{label_y}" font-size="11">{lo}</text><text x="{right}" y="{label_y}" font-size="11" text-anchor="end">{hi}</text>"#,
        lo = escape_html(&chart.x_range.0),
        hi = escape_html(&chart.x_range.1),
    );
    let axis_title_y = bottom + 34.0;
    let centre_x = MARGIN_LEFT + plot_w / 2.0;
    let _ = write!(
        svg,
        r#"<text x="{centre_x}" y="{axis_title_y}" font-size="12" text-anchor="middle">{x}</text>"#,
        x = escape_html(&chart.x_label)
    );
    let tick_x = MARGIN_LEFT - 6.0;
    let _ = write!(
        svg,
        r#"<text x="{tick_x}" y="{MARGIN_TOP}" font-size="11" text-anchor="end">{hi}</text><text x="{tick_x}" y="{bottom}" font-size="11" text-anchor="end">{lo}</text>"#,
        hi = format_number(y_max),
        lo = format_number(y_min),
    );
    let centre_y = MARGIN_TOP + plot_h / 2.0;
    let _ = write!(
        svg,
        r#"<text x="14" y="{centre_y}" font-size="12" text-anchor="middle" transform="rotate(-90 14 {centre_y})">{y}</text>"#,
        y = escape_html(&chart.y_label)
    );

    for (i, series) in chart.series.iter().enumerate() {
        let colour = PALETTE[i % PALETTE.len()];
        let coords: Vec<String> = series
            .points
            .iter()
            .map(|&(x, y)| format!("{:.1},{:.1}", sx(x), sy(y)))
            .collect();
        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="{colour}" stroke-width="1.5" points="{}"/>"#,
            coords.join(" ")
        );

        if let Some(name) = &series.name {
            let legend_x = right + 16.0;
            let legend_y = MARGIN_TOP + 10.0 + i as f64 * 16.0;
            let _ = write!(
                svg,
                r#"<rect x="{legend_x}" y="{}" width="10" height="10" fill="{colour}"/><text x="{}" y="{legend_y}" font-size="11">{}</text>"#,
                legend_y - 9.0,
                legend_x + 14.0,
                escape_html(name)
            );
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Min and max of the values, widened when they coincide.
fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let text = format!("{value:.3}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
