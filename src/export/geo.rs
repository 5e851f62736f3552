//! Map data preparation.
//!
//! Finds coordinate columns, extracts usable points, thins them out for
//! plotting and computes the viewport (centre and zoom) a map renderer
//! needs. The report embeds a plain SVG scatter of the points.

use super::report::escape_html;
use crate::db::ResultTable;
use crate::error::{ProbeError, Result};
use serde::Serialize;
use std::fmt::Write;

/// Maximum number of points handed to a map renderer.
pub const MAX_MAP_POINTS: usize = 5_000;

const LATITUDE_NAMES: &[&str] = &["lat", "latitude", "y"];
const LONGITUDE_NAMES: &[&str] = &["lon", "lng", "longitude", "x"];

/// Zoom levels by largest coordinate span in degrees, widest first.
const ZOOM_STEPS: &[(f64, u8)] = &[
    (100.0, 1),
    (50.0, 2),
    (20.0, 3),
    (10.0, 4),
    (5.0, 5),
    (2.0, 6),
    (1.0, 7),
    (0.5, 8),
    (0.2, 9),
    (0.1, 10),
    (0.05, 11),
    (0.01, 12),
];
const MAX_ZOOM: u8 = 13;

/// One plotted point; `row` is its index in the source table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub row: usize,
    pub lat: f64,
    pub lon: f64,
}

/// Bounding box of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Bounds {
    /// Computes the bounding box, or `None` for an empty set.
    pub fn of(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            lat_min: first.lat,
            lat_max: first.lat,
            lon_min: first.lon,
            lon_max: first.lon,
        };
        Some(points.iter().fold(init, |b, p| Self {
            lat_min: b.lat_min.min(p.lat),
            lat_max: b.lat_max.max(p.lat),
            lon_min: b.lon_min.min(p.lon),
            lon_max: b.lon_max.max(p.lon),
        }))
    }

    /// Midpoint of the box as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.lat_min + self.lat_max) / 2.0,
            (self.lon_min + self.lon_max) / 2.0,
        )
    }

    /// Zoom level (1 to 13) that fits the larger of the two spans.
    pub fn zoom(&self) -> u8 {
        zoom_for_span((self.lat_max - self.lat_min).max(self.lon_max - self.lon_min))
    }
}

/// Returns the zoom level for a coordinate span in degrees.
pub fn zoom_for_span(span: f64) -> u8 {
    ZOOM_STEPS
        .iter()
        .find(|(threshold, _)| span > *threshold)
        .map(|(_, zoom)| *zoom)
        .unwrap_or(MAX_ZOOM)
}

/// Points ready for a map, with viewport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapData {
    pub points: Vec<GeoPoint>,
    pub bounds: Bounds,
    pub center: (f64, f64),
    pub zoom: u8,
    /// True if the points were thinned to [`MAX_MAP_POINTS`].
    pub sampled: bool,
}

/// Guesses the latitude and longitude columns from their names.
///
/// An exact name match wins over a name that merely contains a pattern.
pub fn detect_coordinate_columns(table: &ResultTable) -> (Option<String>, Option<String>) {
    let names = table.column_names();
    (
        detect_column(&names, LATITUDE_NAMES),
        detect_column(&names, LONGITUDE_NAMES),
    )
}

fn detect_column(names: &[&str], patterns: &[&str]) -> Option<String> {
    let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();

    let exact = lowered.iter().position(|n| patterns.contains(&n.as_str()));
    let partial = || {
        lowered
            .iter()
            .position(|n| patterns.iter().any(|p| n.contains(p)))
    };

    exact.or_else(partial).map(|i| names[i].to_string())
}

/// Extracts points from two columns.
///
/// Values are coerced to numbers where they look numeric; rows missing
/// either coordinate are dropped.
pub fn extract_points(table: &ResultTable, lat_column: &str, lon_column: &str) -> Result<Vec<GeoPoint>> {
    let lat = table
        .column(lat_column)
        .ok_or_else(|| ProbeError::config(format!("Unknown latitude column '{lat_column}'")))?;
    let lon = table
        .column(lon_column)
        .ok_or_else(|| ProbeError::config(format!("Unknown longitude column '{lon_column}'")))?;

    Ok(lat
        .values
        .iter()
        .zip(&lon.values)
        .enumerate()
        .filter_map(|(row, (la, lo))| {
            Some(GeoPoint {
                row,
                lat: la.as_f64()?,
                lon: lo.as_f64()?,
            })
        })
        .collect())
}

/// Keeps at most `max` points, taken at an even stride so the result is
/// deterministic and spread over the whole input.
pub fn sample_points(points: Vec<GeoPoint>, max: usize) -> Vec<GeoPoint> {
    if points.len() <= max {
        return points;
    }
    let len = points.len();
    (0..max).map(|i| points[i * len / max]).collect()
}

/// Prepares map data from two coordinate columns.
///
/// Returns `Ok(None)` when no row has usable coordinates.
pub fn prepare_map(table: &ResultTable, lat_column: &str, lon_column: &str) -> Result<Option<MapData>> {
    let points = extract_points(table, lat_column, lon_column)?;
    let sampled = points.len() > MAX_MAP_POINTS;
    let points = sample_points(points, MAX_MAP_POINTS);

    let Some(bounds) = Bounds::of(&points) else {
        return Ok(None);
    };

    Ok(Some(MapData {
        center: bounds.center(),
        zoom: bounds.zoom(),
        bounds,
        points,
        sampled,
    }))
}

const MAP_WIDTH: f64 = 960.0;
const MAP_HEIGHT: f64 = 480.0;
const MAP_PADDING: f64 = 24.0;

/// Renders the points as an SVG scatter over their bounding box.
///
/// Longitude runs left to right and latitude bottom to top; there is no
/// base map, so the caption carries the centre and zoom for reference.
pub fn render_map_svg(map: &MapData, lat_column: &str, lon_column: &str) -> String {
    let b = &map.bounds;
    let lat_span = (b.lat_max - b.lat_min).max(1e-6);
    let lon_span = (b.lon_max - b.lon_min).max(1e-6);
    let plot_w = MAP_WIDTH - 2.0 * MAP_PADDING;
    let plot_h = MAP_HEIGHT - 2.0 * MAP_PADDING;

    let mut svg = format!(
        r##"<svg class="map" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {MAP_WIDTH} {MAP_HEIGHT}" width="100%" role="img"><rect width="{MAP_WIDTH}" height="{MAP_HEIGHT}" fill="#f4f6f8"/>"##
    );
    for p in &map.points {
        let x = MAP_PADDING + (p.lon - b.lon_min) / lon_span * plot_w;
        let y = MAP_PADDING + (b.lat_max - p.lat) / lat_span * plot_h;
        let _ = write!(svg, r##"<circle cx="{x:.1}" cy="{y:.1}" r="3" fill="#1f77b4" fill-opacity="0.7"/>"##);
    }
    svg.push_str("</svg>");

    let _ = write!(
        svg,
        r#"<div class="caption">{} points ({} / {}), centre {:.4}, {:.4}, zoom {}{}</div>"#,
        map.points.len(),
        escape_html(lat_column),
        escape_html(lon_column),
        map.center.0,
        map.center.1,
        map.zoom,
        if map.sampled { ", sampled" } else { "" }
    );
    svg
}
