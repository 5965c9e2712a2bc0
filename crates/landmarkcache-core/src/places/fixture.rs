use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PlacesClient;
use crate::config::OperatingMode;
use crate::error::{LocateError, Result};
use crate::fixtures::FixtureProvider;
use crate::geo::Query;
use crate::models::Landmark;

/// Test-mode client backed by the fixture set.
#[derive(Clone)]
pub struct FixturePlacesClient {
    provider: Arc<FixtureProvider>,
}

impl FixturePlacesClient {
    pub fn new(provider: Arc<FixtureProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PlacesClient for FixturePlacesClient {
    async fn fetch(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<Landmark>> {
        if cancel.is_cancelled() {
            return Err(LocateError::Cancelled);
        }
        let landmarks = self.provider.lookup(query);
        debug!(count = landmarks.len(), "Using test landmarks from fixtures");
        Ok(landmarks)
    }

    async fn fetch_image(
        &self,
        image_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Err(LocateError::Cancelled);
        }
        Ok(self.provider.image(image_id).map(<[u8]>::to_vec))
    }

    fn mode(&self) -> OperatingMode {
        OperatingMode::Test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use std::collections::{BTreeMap, HashMap};

    fn client() -> FixturePlacesClient {
        let landmarks = vec![
            Landmark::new("a", "A", Coordinate::new(1.0, 1.0).unwrap()),
            Landmark::new("b", "B", Coordinate::new(50.0, 50.0).unwrap()),
        ];
        let images = HashMap::from([("a-photo".to_string(), vec![1u8, 2, 3])]);
        FixturePlacesClient::new(Arc::new(FixtureProvider::new(
            landmarks,
            BTreeMap::new(),
            images,
        )))
    }

    #[tokio::test]
    async fn test_fetch_filters_and_never_fails() {
        let client = client();
        let query = Query::new(Coordinate::new(1.0, 1.0).unwrap(), 1000.0).unwrap();
        let result = client.fetch(&query, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "a");
    }

    #[tokio::test]
    async fn test_empty_result_is_ok() {
        let client = client();
        let query = Query::new(Coordinate::new(-30.0, -30.0).unwrap(), 10.0).unwrap();
        let result = client.fetch(&query, &CancellationToken::new()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let client = client();
        let cancel = CancellationToken::new();
        assert_eq!(
            client.fetch_image("a-photo", &cancel).await.unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(client.fetch_image("nope", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let client = client();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let query = Query::new(Coordinate::new(1.0, 1.0).unwrap(), 1000.0).unwrap();
        assert!(matches!(
            client.fetch(&query, &cancel).await,
            Err(LocateError::Cancelled)
        ));
    }
}
