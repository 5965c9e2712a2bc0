//! Places lookup clients.
//!
//! `PlacesClient` has two implementations, selected once at startup from the
//! configured [`OperatingMode`]:
//!
//! - `RemotePlacesClient`: HTTP calls to the places service with retry and
//!   exponential backoff on transient failures
//! - `FixturePlacesClient`: serves the in-memory fixture set, never does I/O

pub mod error;
pub mod fixture;
pub mod remote;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{LocatorConfig, OperatingMode};
use crate::error::Result;
use crate::fixtures::FixtureProvider;
use crate::geo::Query;
use crate::models::Landmark;

pub use error::ApiError;
pub use fixture::FixturePlacesClient;
pub use remote::RemotePlacesClient;

/// Source of landmarks for a radius query.
///
/// Implementations may over-return (results outside the radius, duplicate
/// ids); the locator filters and deduplicates. An empty result is a valid
/// answer, not an error.
#[async_trait]
pub trait PlacesClient: Send + Sync {
    /// Fetch landmarks near `query`.
    ///
    /// Fails with `UpstreamUnavailable` after exhausting retries on transient
    /// failures, `UpstreamRejected` on permanent ones, and `Cancelled` when
    /// `cancel` fires.
    async fn fetch(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<Landmark>>;

    /// Resolve the bytes of an image reference. `Ok(None)` when unknown.
    async fn fetch_image(
        &self,
        image_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>>;

    /// Mode this client serves.
    fn mode(&self) -> OperatingMode;
}

/// Build the client for the configured mode.
pub fn build_client(
    config: &LocatorConfig,
    fixtures: Arc<FixtureProvider>,
) -> Result<Arc<dyn PlacesClient>> {
    match config.mode {
        OperatingMode::Production => Ok(Arc::new(RemotePlacesClient::from_config(config)?)),
        OperatingMode::Test => Ok(Arc::new(FixturePlacesClient::new(fixtures))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_follows_mode() {
        let mut config = LocatorConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        let fixtures = Arc::new(FixtureProvider::default());

        let client = build_client(&config, fixtures.clone()).unwrap();
        assert_eq!(client.mode(), OperatingMode::Production);

        config.mode = OperatingMode::Test;
        let client = build_client(&config, fixtures).unwrap();
        assert_eq!(client.mode(), OperatingMode::Test);
    }
}
