//! Export integration tests.
//!
//! Runs a query against the mock session, filters the result and writes
//! it out as a spreadsheet, report and map data.

use iot_query_probe::config::{Config, LimitsConfig};
use iot_query_probe::db::{ColumnInfo, MockSession, ResultTable, Value};
use iot_query_probe::export::{report_file_stem, timestamped_file_name, ChartSpec};
use iot_query_probe::output::{format_values, OutputFormat, ResultOutput};
use iot_query_probe::query::{
    apply_filters, distinct_values, ColumnFilter, FilteredTable, QueryProbe, Redactor,
    DISTINCT_VALUE_LIMIT,
};
use iot_query_probe::ProbeError;
use pretty_assertions::assert_eq;

fn stations() -> MockSession {
    let sites = ["north", "south", "east"];
    MockSession::new(
        vec![
            ColumnInfo::new("station", "TEXT"),
            ColumnInfo::new("site", "TEXT"),
            ColumnInfo::new("latitude", "FLOAT8"),
            ColumnInfo::new("longitude", "FLOAT8"),
            ColumnInfo::new("pm25", "INT4"),
        ],
        (0..30)
            .map(|i| {
                vec![
                    Value::from(format!("st-{i:02}")),
                    Value::from(sites[i % 3]),
                    Value::Float(48.0 + i as f64 * 0.01),
                    Value::Float(11.0 + i as f64 * 0.01),
                    Value::Int(i as i64),
                ]
            })
            .collect(),
    )
}

async fn query_stations() -> ResultTable {
    let probe = QueryProbe::from_config(&Config::default(), Redactor::default()).unwrap();
    let mut session = stations();
    probe
        .run("SELECT station, site, latitude, longitude, pm25 FROM stations", &mut session)
        .await
        .unwrap()
}

async fn north_stations() -> FilteredTable {
    let table = query_stations().await;
    let filters = ColumnFilter::from_pairs([("site".to_string(), "north".to_string())]);
    apply_filters(&table, &filters).unwrap()
}

/// Scenario: Exporting filtered results to a spreadsheet
/// Given 30 stations across three sites
/// When the rows of one site are exported as xlsx
/// Then a workbook file is written
#[tokio::test]
async fn test_filtered_spreadsheet_export() {
    let filtered = north_stations().await;
    assert!(filtered.filtered);
    assert_eq!(filtered.row_count(), 10);

    let bytes = ResultOutput::new(OutputFormat::Xlsx, LimitsConfig::default())
        .render(&filtered)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stations.xlsx");
    std::fs::write(&path, &bytes).unwrap();

    let written = std::fs::read(&path).unwrap();
    assert!(written.starts_with(b"PK"));
}

/// Scenario: Exporting a report with a title and description
/// Given filtered station rows
/// When an HTML report is rendered
/// Then it carries the escaped title, the description and every row
#[tokio::test]
async fn test_html_report_export() {
    let filtered = north_stations().await;

    let output = ResultOutput::new(OutputFormat::Html, LimitsConfig::default())
        .with_report("Air <Quality>", Some("North site only".to_string()));
    let html = String::from_utf8(output.render(&filtered).unwrap()).unwrap();

    assert!(html.contains("<h1>Air &lt;Quality&gt;</h1>"));
    assert!(html.contains("North site only"));
    assert!(html.contains("Rows: 10"));
    assert!(html.contains("<th>pm25</th>"));
    assert!(html.contains("st-00"));
    assert!(!html.contains("st-01"));

    let name = timestamped_file_name(&report_file_stem(&output.report().title), "html", chrono::Utc::now());
    assert!(name.starts_with("Air__Quality__"));
    assert!(name.ends_with(".html"));
}

/// Scenario: Report with chart and map
/// Given all 30 stations
/// When a report is rendered with pm25 charted per site
/// Then the report carries a chart with one line per site
/// And a map with every station plotted
#[tokio::test]
async fn test_html_report_with_chart_and_map() {
    let table = query_stations().await;
    let filtered = apply_filters(&table, &[]).unwrap();

    let html = String::from_utf8(
        ResultOutput::new(OutputFormat::Html, LimitsConfig::default())
            .with_chart(Some(ChartSpec::new("station", "pm25", Some("site".to_string()))))
            .render(&filtered)
            .unwrap(),
    )
    .unwrap();

    assert!(html.contains("<h2>Chart</h2>"));
    assert!(html.contains("pm25 over station"));
    assert_eq!(html.matches("<polyline").count(), 3);
    assert!(html.contains("<h2>Map</h2>"));
    assert_eq!(html.matches("<circle").count(), 30);
    assert!(html.contains("30 points (latitude / longitude)"));
}

/// Scenario: Charting a column the result does not have
#[tokio::test]
async fn test_html_report_with_unknown_chart_column_fails() {
    let filtered = north_stations().await;

    let err = ResultOutput::new(OutputFormat::Html, LimitsConfig::default())
        .with_chart(Some(ChartSpec::new("station", "humidity", None)))
        .render(&filtered)
        .unwrap_err();

    assert!(matches!(err, ProbeError::Config(_)));
}

/// Scenario: Listing filter choices
/// Given the north stations
/// When the distinct sites and stations are listed
/// Then only the remaining values appear, in first-seen order
#[tokio::test]
async fn test_distinct_values_after_filtering() {
    let filtered = north_stations().await;

    let sites = distinct_values(&filtered.table, "site", DISTINCT_VALUE_LIMIT).unwrap();
    assert_eq!(format_values(&sites, OutputFormat::Table).unwrap(), "north\n");

    let stations = distinct_values(&filtered.table, "station", 3).unwrap();
    assert_eq!(
        format_values(&stations, OutputFormat::Table).unwrap(),
        "st-00\nst-03\nst-06\n"
    );
}

/// Scenario: Report row cap
/// Given a report row cap of 5
/// When all 30 stations are rendered
/// Then the row count still reports 30 but only 5 rows are drawn
#[tokio::test]
async fn test_html_report_respects_row_cap() {
    let table = query_stations().await;
    let filtered = apply_filters(&table, &[]).unwrap();
    let limits = LimitsConfig {
        report_row_cap: 5,
        ..Default::default()
    };

    let html = String::from_utf8(
        ResultOutput::new(OutputFormat::Html, limits)
            .render(&filtered)
            .unwrap(),
    )
    .unwrap();

    assert!(html.contains("Rows: 30"));
    assert!(html.contains("st-04"));
    assert!(!html.contains("st-05"));
}

/// Scenario: Map data from detected coordinate columns
/// Given station rows with latitude and longitude columns
/// When map output is rendered without explicit columns
/// Then every point is plotted and the viewport covers them
#[tokio::test]
async fn test_map_output_detects_coordinates() {
    let filtered = north_stations().await;

    let json = ResultOutput::new(OutputFormat::Map, LimitsConfig::default())
        .render(&filtered)
        .unwrap();
    let map: serde_json::Value = serde_json::from_slice(&json).unwrap();

    assert_eq!(map["points"].as_array().unwrap().len(), 10);
    assert_eq!(map["sampled"], serde_json::Value::Bool(false));
    let lat_min = map["bounds"]["lat_min"].as_f64().unwrap();
    let lat_max = map["bounds"]["lat_max"].as_f64().unwrap();
    assert!(lat_min <= lat_max);
    assert!((lat_min - 48.0).abs() < 1e-9);
}

/// Scenario: Map output with no coordinate columns
#[tokio::test]
async fn test_map_output_without_coordinates_fails() {
    let table = query_stations().await;
    let filtered = apply_filters(&table, &[]).unwrap();

    let err = ResultOutput::new(OutputFormat::Map, LimitsConfig::default())
        .with_coordinates(Some("pm25".to_string()), Some("missing".to_string()))
        .render(&filtered)
        .unwrap_err();

    assert!(matches!(err, ProbeError::Config(_)));
}
