//! Coordinate string parsing.

use regex::Regex;
use std::sync::LazyLock;

/// Two signed decimal numbers separated by a comma (`"49.28, -123.13"`).
static LAT_LON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([\-0-9.]+)\s*,\s*([\-0-9.]+)\s*$").expect("valid regex")
});

/// Parses a combined `"lat,lon"` string.
///
/// Returns `None` if the value is missing or does not hold two finite
/// numbers.
#[must_use]
pub fn parse_lat_lon(raw: Option<&str>) -> Option<(f64, f64)> {
    let caps = LAT_LON_RE.captures(raw?)?;
    let lat = caps[1].parse::<f64>().ok().filter(|v| v.is_finite())?;
    let lon = caps[2].parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((lat, lon))
}

/// Parses a numeric cell, treating blanks and garbage as missing.
#[must_use]
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
