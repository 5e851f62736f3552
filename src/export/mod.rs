//! Export and render adapters.
//!
//! Consumers of a [`ResultTable`](crate::db::ResultTable): spreadsheet
//! bytes, a printable HTML report with optional chart and map, and
//! map-ready coordinate data.

mod chart;
pub mod geo;
mod report;
mod spreadsheet;

pub use chart::{prepare_chart, render_chart_svg, ChartData, ChartSpec, Series};
pub use geo::{
    detect_coordinate_columns, prepare_map, render_map_svg, GeoPoint, MapData, MAX_MAP_POINTS,
};
pub use report::{
    build_report, escape_html, format_thousands, render_report, report_file_stem,
    timestamped_file_name, ReportOptions, DEFAULT_REPORT_TITLE,
};
pub use spreadsheet::{to_xlsx, SHEET_NAME};
