//! Coordinate parsing and formatting.
//!
//! Accepts decimal degrees (`"40.7484,-73.9857"`) and degrees-minutes-seconds
//! with the hemisphere after (`40°44'54"N 73°59'8"W`) or before
//! (`N40°44'54", W73°59'8"`) each component, consistently. Out-of-range values
//! are rejected, never clamped.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LocateError, Result};

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Degrees, optional minutes, optional seconds.
const DMS_MAGNITUDE: &str =
    r#"(?P<deg>\d+(?:\.\d+)?)\s*°\s*(?:(?P<min>\d+(?:\.\d+)?)\s*['′]\s*)?(?:(?P<sec>\d+(?:\.\d+)?)\s*(?:"|″|''))?"#;

/// `40°44'54"N`
static DMS_SUFFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*(?P<hem>[NSEWnsew])", DMS_MAGNITUDE))
        .expect("suffixed DMS regex must compile")
});

/// `N40°44'54"`
static DMS_PREFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?P<hem>[NSEWnsew])\s*{}", DMS_MAGNITUDE))
        .expect("prefixed DMS regex must compile")
});

/// A validated WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&lat) {
            return Err(LocateError::InvalidCoordinate(format!(
                "latitude {} outside [{}, {}]",
                lat, MIN_LAT, MAX_LAT
            )));
        }
        if !lon.is_finite() || !(MIN_LON..=MAX_LON).contains(&lon) {
            return Err(LocateError::InvalidCoordinate(format!(
                "longitude {} outside [{}, {}]",
                lon, MIN_LON, MAX_LON
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Parse decimal or DMS notation.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LocateError::InvalidCoordinate("empty input".to_string()));
        }
        if text.contains('°') {
            parse_dms_pair(text)
        } else {
            parse_decimal_pair(text)
        }
    }

    /// Render as `40°44'54.24"N, 73°59'8.52"W`.
    pub fn to_dms_string(&self) -> String {
        format!(
            "{}, {}",
            format_dms(self.lat, true),
            format_dms(self.lon, false)
        )
    }

    /// Validate a coordinate that bypassed [`Coordinate::new`] (e.g. deserialized).
    pub fn validated(self) -> Result<Self> {
        Self::new(self.lat, self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

impl FromStr for Coordinate {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(text: &str, why: &str) -> LocateError {
    LocateError::InvalidCoordinate(format!("{:?}: {}", text, why))
}

fn parse_decimal_pair(text: &str) -> Result<Coordinate> {
    let parts: Vec<&str> = if text.contains(',') {
        text.split(',').map(str::trim).collect()
    } else {
        text.split_whitespace().collect()
    };
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid(text, "expected two components"));
    }

    let lat: f64 = parts[0]
        .parse()
        .map_err(|_| invalid(text, "latitude is not a number"))?;
    let lon: f64 = parts[1]
        .parse()
        .map_err(|_| invalid(text, "longitude is not a number"))?;

    Coordinate::new(lat, lon)
}

fn parse_dms_pair(text: &str) -> Result<Coordinate> {
    let mut lat = None;
    let mut lon = None;
    let mut last_end = 0;

    // One style per input; a letter on both sides leaves a stray character
    let pattern = if text.starts_with(|c: char| "NSEWnsew".contains(c)) {
        &*DMS_PREFIXED
    } else {
        &*DMS_SUFFIXED
    };

    for caps in pattern.captures_iter(text) {
        let whole = caps
            .get(0)
            .ok_or_else(|| invalid(text, "malformed DMS component"))?;
        if !is_separator(&text[last_end..whole.start()]) {
            return Err(invalid(text, "unexpected characters between components"));
        }
        last_end = whole.end();

        let degrees: f64 = parse_number(caps.name("deg").map(|m| m.as_str()), text)?;
        let minutes: f64 = parse_number(caps.name("min").map(|m| m.as_str()).or(Some("0")), text)?;
        let seconds: f64 = parse_number(caps.name("sec").map(|m| m.as_str()).or(Some("0")), text)?;
        if minutes >= 60.0 || seconds >= 60.0 {
            return Err(invalid(text, "minutes and seconds must be below 60"));
        }

        let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
        let hemisphere = caps
            .name("hem")
            .map(|m| m.as_str().to_ascii_uppercase())
            .unwrap_or_default();
        let slot = match hemisphere.as_str() {
            "N" | "S" => &mut lat,
            _ => &mut lon,
        };
        if slot.is_some() {
            return Err(invalid(text, "duplicate hemisphere"));
        }
        *slot = Some(match hemisphere.as_str() {
            "S" | "W" => -magnitude,
            _ => magnitude,
        });
    }

    if !is_separator(&text[last_end..]) {
        return Err(invalid(text, "trailing characters"));
    }

    match (lat, lon) {
        (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
        _ => Err(invalid(text, "expected one N/S and one E/W component")),
    }
}

fn parse_number(value: Option<&str>, text: &str) -> Result<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| invalid(text, "malformed number"))
}

fn is_separator(s: &str) -> bool {
    s.chars().all(|c| c.is_whitespace() || c == ',')
}

fn format_dms(decimal: f64, is_latitude: bool) -> String {
    let direction = match (is_latitude, decimal >= 0.0) {
        (true, true) => 'N',
        (true, false) => 'S',
        (false, true) => 'E',
        (false, false) => 'W',
    };

    // Work in hundredths of a second so rounding carries into minutes/degrees.
    let hundredths = (decimal.abs() * 360_000.0).round() as u64;
    let degrees = hundredths / 360_000;
    let minutes = (hundredths % 360_000) / 6_000;
    let seconds = (hundredths % 6_000) as f64 / 100.0;

    format!("{}°{}'{}\"{}", degrees, minutes, seconds, direction)
}
