//! landmarkcache core - nearby landmark lookup that keeps working offline.
//!
//! [`Locator`] turns a (coordinate, radius) query into a deduplicated,
//! distance-filtered set of landmarks. It serves fresh cache entries
//! directly, refreshes stale or missing ones from the places service, and
//! falls back to a stale entry (flagged `degraded`) when the service is
//! unreachable. In test mode the places service is replaced by a fixture set
//! and cache data lives in a separate namespace.
//!
//! ```no_run
//! # async fn run() -> landmarkcache_core::Result<()> {
//! use landmarkcache_core::{Locator, LocatorConfig, Query};
//!
//! let config = LocatorConfig::load().map_err(|e| landmarkcache_core::LocateError::Config(e.to_string()))?;
//! let locator = Locator::new(&config)?;
//! let result = locator.locate(&Query::parse("40.7484,-73.9857", 500.0)?).await?;
//! for landmark in &result.landmarks {
//!     println!("{} ({})", landmark.name, landmark.display_distance());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fixtures;
pub mod geo;
pub mod locator;
pub mod logging;
pub mod models;
pub mod places;

pub use cache::{CacheEntry, CacheStats, CacheStore, ImageBlob};
pub use config::{LocatorConfig, OperatingMode, RetryConfig};
pub use error::{LocateError, Result};
pub use fixtures::FixtureProvider;
pub use geo::{canonicalize, distance_meters, is_within_radius, Coordinate, Query, QuerySignature};
pub use locator::{LocateResult, Locator, Status};
pub use models::Landmark;
pub use places::PlacesClient;
