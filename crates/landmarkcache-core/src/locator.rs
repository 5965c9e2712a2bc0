//! Retrieval entry point: cache lookup, refresh and degradation policy.
//!
//! Cache file I/O runs on tokio's blocking pool so lookups never stall the
//! async worker threads.

use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::config::{LocatorConfig, OperatingMode};
use crate::error::{LocateError, Result};
use crate::fixtures::FixtureProvider;
use crate::geo::{Query, QuerySignature};
use crate::models::{dedupe_by_id, Landmark};
use crate::places::{build_client, PlacesClient};

/// How a result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Fetched from the places source during this call.
    Fresh,
    /// Served from a cache entry still within its TTL.
    Cached,
    /// Served from an expired entry because the refresh failed transiently.
    Degraded,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Fresh => write!(f, "fresh"),
            Status::Cached => write!(f, "cached"),
            Status::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateResult {
    pub landmarks: Vec<Landmark>,
    pub status: Status,
    pub signature: QuerySignature,
    /// When the returned landmarks were fetched from the source.
    pub fetched_at: DateTime<Utc>,
    /// Refresh failure hidden behind a degraded result.
    pub error: Option<String>,
}

impl LocateResult {
    fn fresh(signature: QuerySignature, landmarks: Vec<Landmark>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            landmarks,
            status: Status::Fresh,
            signature,
            fetched_at,
            error: None,
        }
    }

    fn from_entry(entry: CacheEntry, status: Status, error: Option<String>) -> Self {
        Self {
            landmarks: entry.landmarks,
            status,
            signature: entry.signature,
            fetched_at: entry.fetched_at,
            error,
        }
    }
}

/// Cache-then-source landmark lookup.
///
/// The operating mode is fixed at construction. Clones share the client and
/// point at the same cache namespace.
#[derive(Clone)]
pub struct Locator {
    mode: OperatingMode,
    client: Arc<dyn PlacesClient>,
    store: CacheStore,
}

impl Locator {
    /// Validate `config`, load fixtures (test mode) and open the cache namespace.
    pub fn new(config: &LocatorConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| LocateError::Config(format!("{:#}", e)))?;

        let fixtures = match config.mode {
            OperatingMode::Test => FixtureProvider::from_config(config)?,
            OperatingMode::Production => FixtureProvider::default(),
        };
        let client = build_client(config, Arc::new(fixtures))?;
        let store = CacheStore::for_config(config)?;

        info!(mode = %config.mode, cache = %store.root().display(), "Locator ready");
        Ok(Self::with_client(config.mode, client, store))
    }

    /// Assemble from parts. The client's mode must match `mode`.
    pub fn with_client(mode: OperatingMode, client: Arc<dyn PlacesClient>, store: CacheStore) -> Self {
        debug_assert_eq!(client.mode(), mode);
        Self {
            mode,
            client,
            store,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub async fn locate(&self, query: &Query) -> Result<LocateResult> {
        self.locate_with_cancel(query, &CancellationToken::new()).await
    }

    /// Parse a textual center, then locate. Parse errors happen before any I/O.
    pub async fn locate_text(&self, center: &str, radius_meters: f64) -> Result<LocateResult> {
        let query = Query::parse(center, radius_meters)?;
        self.locate(&query).await
    }

    /// Locate landmarks around `query`.
    ///
    /// Cancelling `cancel` aborts an in-flight refresh with
    /// [`LocateError::Cancelled`]; nothing is written to the cache afterwards.
    pub async fn locate_with_cancel(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<LocateResult> {
        let signature = query.signature();

        // Fixture data is deterministic and in-memory; caching it would only
        // let stale test runs leak into later ones.
        if self.mode == OperatingMode::Test {
            let landmarks = self.fetch_filtered(query, cancel).await?;
            debug!(%signature, count = landmarks.len(), "Resolved from fixtures");
            return Ok(LocateResult::fresh(signature, landmarks, Utc::now()));
        }

        let lookup_signature = signature.clone();
        let cached = self
            .with_store(move |store| Ok(store.get(&lookup_signature)))
            .await
            .unwrap_or(None);

        let stale = match cached {
            Some(entry) if self.store.is_fresh(&entry) => {
                debug!(%signature, age = %entry.age_display(), "Cache hit");
                return Ok(LocateResult::from_entry(entry, Status::Cached, None));
            }
            Some(entry) => {
                debug!(%signature, age = %entry.age_display(), "Cache entry stale, refreshing");
                Some(entry)
            }
            None => {
                debug!(%signature, "Cache miss");
                None
            }
        };

        match self.fetch_filtered(query, cancel).await {
            Ok(landmarks) => {
                if cancel.is_cancelled() {
                    return Err(LocateError::Cancelled);
                }
                let put_signature = signature.clone();
                let entry = self
                    .with_store(move |store| store.put(&put_signature, &landmarks))
                    .await?;
                info!(%signature, count = entry.landmarks.len(), "Fetched and cached landmarks");
                Ok(LocateResult::from_entry(entry, Status::Fresh, None))
            }
            Err(e) if e.allows_degraded() => match stale {
                Some(entry) => {
                    warn!(%signature, error = %e, age = %entry.age_display(), "Refresh failed, serving stale entry");
                    let mut result = LocateResult::from_entry(entry, Status::Degraded, Some(e.to_string()));
                    annotate(&mut result.landmarks, query);
                    Ok(result)
                }
                None => Err(e),
            },
            Err(e) => {
                if e.is_rejected() {
                    warn!(%signature, error = %e, "Places request rejected");
                }
                Err(e)
            }
        }
    }

    /// Bytes for `image_id`: cache first, then the places source.
    pub async fn fetch_image(&self, image_id: &str) -> Result<Vec<u8>> {
        self.fetch_image_with_cancel(image_id, &CancellationToken::new())
            .await
    }

    pub async fn fetch_image_with_cancel(
        &self,
        image_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let id = image_id.to_string();
        let cached = self
            .with_store(move |store| Ok(store.get_image_blob(&id)))
            .await
            .unwrap_or(None);

        let stale = match cached {
            Some(blob) if !blob.is_expired(self.store.image_ttl()) => return Ok(blob.bytes),
            other => other,
        };

        match self.client.fetch_image(image_id, cancel).await {
            Ok(Some(bytes)) => {
                if cancel.is_cancelled() {
                    return Err(LocateError::Cancelled);
                }
                let id = image_id.to_string();
                self.with_store(move |store| store.put_image(&id, &bytes).map(|()| bytes))
                    .await
            }
            Ok(None) => match stale {
                Some(blob) => Ok(blob.bytes),
                None => Err(LocateError::NotFound(format!("image '{}'", image_id))),
            },
            Err(e) if e.allows_degraded() => match stale {
                Some(blob) => {
                    warn!(image_id, error = %e, "Image refresh failed, serving stale copy");
                    Ok(blob.bytes)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Wipe the test namespace. Refused in production mode.
    pub fn reset_test_cache(&self) -> Result<()> {
        if self.mode != OperatingMode::Test {
            return Err(LocateError::Config(
                "cache reset is only allowed in test mode".to_string(),
            ));
        }
        self.store.clear_all()
    }

    /// Run blocking cache I/O on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&CacheStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let root = store.root().to_path_buf();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| LocateError::cache_write(root, io::Error::other(e)))?
    }

    /// Fetch from the active client, then filter to the radius, dedupe and
    /// annotate distances. Upstream order is preserved.
    async fn fetch_filtered(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Vec<Landmark>> {
        if cancel.is_cancelled() {
            return Err(LocateError::Cancelled);
        }
        let fetched = self.client.fetch(query, cancel).await?;
        let total = fetched.len();

        let within: Vec<Landmark> = fetched
            .into_iter()
            .filter(|landmark| query.contains(&landmark.location))
            .collect();
        let mut landmarks = dedupe_by_id(within);
        annotate(&mut landmarks, query);

        debug!(total, kept = landmarks.len(), "Filtered places results");
        Ok(landmarks)
    }
}

fn annotate(landmarks: &mut [Landmark], query: &Query) {
    for landmark in landmarks {
        landmark.annotate_distance(query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Client returning a scripted sequence of outcomes.
    struct ScriptedClient {
        outcomes: Mutex<Vec<Result<Vec<Landmark>>>>,
        images: Mutex<Vec<Result<Option<Vec<u8>>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(outcomes: Vec<Result<Vec<Landmark>>>) -> Arc<Self> {
            Self::with_images(outcomes, vec![])
        }

        /// Image lookups pop `images` first, then fall back to serving "known".
        fn with_images(
            outcomes: Vec<Result<Vec<Landmark>>>,
            images: Vec<Result<Option<Vec<u8>>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().rev().collect()),
                images: Mutex::new(images.into_iter().rev().collect()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PlacesClient for ScriptedClient {
        async fn fetch(&self, _query: &Query, _cancel: &CancellationToken) -> Result<Vec<Landmark>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_image(
            &self,
            image_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<Option<Vec<u8>>> {
            if let Some(outcome) = self.images.lock().unwrap().pop() {
                return outcome;
            }
            Ok((image_id == "known").then(|| b"jpeg".to_vec()))
        }

        fn mode(&self) -> OperatingMode {
            OperatingMode::Production
        }
    }

    fn query() -> Query {
        Query::new(Coordinate::new(40.0, -74.0).unwrap(), 1000.0).unwrap()
    }

    fn near(id: &str) -> Landmark {
        Landmark::new(id, id, Coordinate::new(40.001, -74.0).unwrap())
    }

    fn locator(dir: &TempDir, client: Arc<ScriptedClient>) -> Locator {
        let store = CacheStore::new(dir.path().join("production"), Duration::hours(1), Duration::days(7))
            .unwrap();
        Locator::with_client(OperatingMode::Production, client, store)
    }

    /// Every cached image is already past its TTL.
    fn expired_image_locator(dir: &TempDir, client: Arc<ScriptedClient>) -> Locator {
        let store = CacheStore::new(dir.path().join("production"), Duration::hours(1), Duration::zero())
            .unwrap();
        store.put_image("photo", b"old-bytes").unwrap();
        Locator::with_client(OperatingMode::Production, client, store)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![Ok(vec![near("a")])]);
        let locator = locator(&dir, client.clone());

        let result = locator.locate(&query()).await.unwrap();
        assert_eq!(result.status, Status::Fresh);
        assert_eq!(result.landmarks.len(), 1);
        assert!(result.landmarks[0].distance_meters.unwrap() > 100.0);
        assert!(locator.store().get(&query().signature()).is_some());

        let again = locator.locate(&query()).await.unwrap();
        assert_eq!(again.status, Status::Cached);
        assert_eq!(again.landmarks, result.landmarks);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_with_unavailable_fails() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![Err(LocateError::UpstreamUnavailable {
            attempts: 4,
            reason: "timeout".into(),
        })]);
        let err = locator(&dir, client).locate(&query()).await.unwrap_err();
        assert!(err.allows_degraded());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_writes() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![Ok(vec![near("a")])]);
        let locator = locator(&dir, client.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = locator.locate_with_cancel(&query(), &cancel).await.unwrap_err();
        assert!(matches!(err, LocateError::Cancelled));
        assert!(locator.store().get(&query().signature()).is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_image_resolves_then_caches() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir, ScriptedClient::new(vec![]));

        assert_eq!(locator.fetch_image("known").await.unwrap(), b"jpeg".to_vec());
        assert_eq!(locator.store().get_image("known"), Some(b"jpeg".to_vec()));

        let err = locator.fetch_image("unknown").await.unwrap_err();
        assert!(matches!(err, LocateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_image_prefers_cache() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir, ScriptedClient::new(vec![]));
        locator.store().put_image("unknown", b"cached").unwrap();
        assert_eq!(locator.fetch_image("unknown").await.unwrap(), b"cached".to_vec());
    }

    #[tokio::test]
    async fn test_expired_image_served_when_refresh_unavailable() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::with_images(
            vec![],
            vec![Err(LocateError::UpstreamUnavailable {
                attempts: 4,
                reason: "connection reset".into(),
            })],
        );
        let locator = expired_image_locator(&dir, client);

        assert_eq!(locator.fetch_image("photo").await.unwrap(), b"old-bytes".to_vec());
        assert_eq!(locator.store().get_image("photo"), Some(b"old-bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_image_served_when_source_forgets_it() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::with_images(vec![], vec![Ok(None)]);
        let locator = expired_image_locator(&dir, client);

        assert_eq!(locator.fetch_image("photo").await.unwrap(), b"old-bytes".to_vec());
    }

    #[tokio::test]
    async fn test_expired_image_replaced_on_successful_refresh() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::with_images(vec![], vec![Ok(Some(b"new-bytes".to_vec()))]);
        let locator = expired_image_locator(&dir, client);

        assert_eq!(locator.fetch_image("photo").await.unwrap(), b"new-bytes".to_vec());
        assert_eq!(locator.store().get_image("photo"), Some(b"new-bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_image_rejection_is_not_masked() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::with_images(
            vec![],
            vec![Err(LocateError::UpstreamRejected("Unauthorized".into()))],
        );
        let locator = expired_image_locator(&dir, client);

        let err = locator.fetch_image("photo").await.unwrap_err();
        assert!(err.is_rejected());
    }

    #[tokio::test]
    async fn test_stale_entry_degrades_on_unavailable() {
        let dir = TempDir::new().unwrap();
        let expired = CacheStore::new(dir.path().join("production"), Duration::zero(), Duration::days(7))
            .unwrap();
        expired.put(&query().signature(), &[near("old")]).unwrap();

        let client = ScriptedClient::new(vec![Err(LocateError::UpstreamUnavailable {
            attempts: 4,
            reason: "timeout".into(),
        })]);
        let locator = Locator::with_client(OperatingMode::Production, client, expired);
        let result = locator.locate(&query()).await.unwrap();

        assert_eq!(result.status, Status::Degraded);
        assert_eq!(result.landmarks[0].id, "old");
        assert!(result.landmarks[0].distance_meters.is_some());
        assert!(result.error.unwrap().contains("timeout"));
    }

    #[test]
    fn test_reset_refused_in_production() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir, ScriptedClient::new(vec![]));
        assert!(matches!(
            locator.reset_test_cache(),
            Err(LocateError::Config(_))
        ));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Degraded).unwrap(), "\"degraded\"");
        assert_eq!(Status::Cached.to_string(), "cached");
    }
}
