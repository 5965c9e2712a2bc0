//! Radius queries: great-circle distance, radius membership and cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Coordinate;
use crate::error::{LocateError, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Decimal places kept for the center when deriving a signature (~1.1 m).
pub const SIGNATURE_COORD_PRECISION: i32 = 5;

/// A (center, radius) lookup. Constructed per call, never cached itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub center: Coordinate,
    pub radius_meters: f64,
}

impl Query {
    pub fn new(center: Coordinate, radius_meters: f64) -> Result<Self> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(LocateError::InvalidCoordinate(format!(
                "radius must be a positive number of meters, got {}",
                radius_meters
            )));
        }
        Ok(Self {
            center: center.validated()?,
            radius_meters,
        })
    }

    /// Parse the center from text and attach a radius.
    pub fn parse(center: &str, radius_meters: f64) -> Result<Self> {
        Self::new(Coordinate::parse(center)?, radius_meters)
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        is_within_radius(point, self)
    }

    pub fn signature(&self) -> QuerySignature {
        canonicalize(self)
    }
}

/// Canonical cache key for a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuerySignature(String);

impl QuerySignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Great-circle distance in meters (haversine).
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Boundary-inclusive radius membership.
pub fn is_within_radius(point: &Coordinate, query: &Query) -> bool {
    distance_meters(point, &query.center) <= query.radius_meters
}

/// Derive the cache key from the rounded center and radius.
pub fn canonicalize(query: &Query) -> QuerySignature {
    let lat = round_to(query.center.lat, SIGNATURE_COORD_PRECISION);
    let lon = round_to(query.center.lon, SIGNATURE_COORD_PRECISION);
    let radius = round_to(query.radius_meters, 1);

    QuerySignature(format!(
        "{:.prec$},{:.prec$};r={:.1}",
        lat,
        lon,
        radius,
        prec = SIGNATURE_COORD_PRECISION as usize
    ))
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // Fold -0.0 into 0.0 so both hemispheres of zero share a key.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
