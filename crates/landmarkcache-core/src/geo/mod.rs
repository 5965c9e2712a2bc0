//! Coordinate utilities.
//!
//! Parsing and validation of coordinate text, great-circle distance, radius
//! membership and canonical query signatures used as cache keys.

pub mod coordinate;
pub mod query;

pub use coordinate::Coordinate;
pub use query::{canonicalize, distance_meters, is_within_radius, Query, QuerySignature};
