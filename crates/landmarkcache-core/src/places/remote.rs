//! HTTP client for the remote places service.
//!
//! Transient failures (timeouts, connection errors, truncated bodies, 5xx,
//! rate limiting) are retried with exponential backoff up to
//! `RetryConfig::max_attempts`. Permanent failures fail on the first attempt.
//!
//! Place page URLs come from a per-result details lookup. Those lookups are
//! single-attempt and best effort: a failure leaves `url` empty.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::{NearbySearchResponse, PlaceDetailsResponse};
use super::{ApiError, PlacesClient};
use crate::config::{LocatorConfig, OperatingMode, RetryConfig, DEFAULT_PLACE_TYPES};
use crate::error::{LocateError, Result};
use crate::geo::Query;
use crate::models::Landmark;

/// Photo width requested from the photo endpoint.
const PHOTO_MAX_WIDTH: u32 = 800;

/// Places API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RemotePlacesClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
    max_radius_meters: f64,
    place_types: Vec<String>,
    fetch_place_urls: bool,
}

impl RemotePlacesClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryConfig,
        max_radius_meters: f64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(retry.request_timeout_secs))
            .build()
            .map_err(|e| LocateError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry,
            max_radius_meters,
            place_types: DEFAULT_PLACE_TYPES.iter().map(|t| t.to_string()).collect(),
            fetch_place_urls: false,
        })
    }

    /// Replace the nearby search `type` filter.
    pub fn with_place_types(mut self, place_types: Vec<String>) -> Self {
        self.place_types = place_types;
        self
    }

    /// Enable per-result details lookups for `Landmark::url`.
    pub fn with_place_urls(mut self, enabled: bool) -> Self {
        self.fetch_place_urls = enabled;
        self
    }

    /// Build from configuration; a production client without an API key is a
    /// configuration error.
    pub fn from_config(config: &LocatorConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .map_err(|e| LocateError::Config(format!("{:#}", e)))?
            .ok_or_else(|| {
                LocateError::Config(format!(
                    "No places API key configured (set {} or api_key)",
                    crate::config::API_KEY_ENV
                ))
            })?;

        Ok(Self::new(
            config.places_base_url.clone(),
            api_key,
            config.retry.clone(),
            config.max_radius_meters,
        )?
        .with_place_types(config.place_types.clone())
        .with_place_urls(config.fetch_place_urls))
    }

    /// Radius sent upstream, clamped to the service maximum.
    fn request_radius(&self, query: &Query) -> u64 {
        query.radius_meters.min(self.max_radius_meters).ceil() as u64
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> std::result::Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn send_error(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::NetworkError(e)
        }
    }

    async fn nearby_once(&self, query: &Query) -> std::result::Result<NearbySearchResponse, ApiError> {
        let url = format!("{}/nearbysearch/json", self.base_url);
        let location = format!("{},{}", query.center.lat, query.center.lon);
        let radius = self.request_radius(query).to_string();
        let types = self.place_types.join("|");

        let mut params = vec![
            ("location", location.as_str()),
            ("radius", radius.as_str()),
            ("key", self.api_key.as_str()),
        ];
        if !types.is_empty() {
            params.push(("type", types.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(Self::send_error)?;

        let response = Self::check_response(response).await?;
        let text = response.text().await.map_err(Self::send_error)?;
        let parsed: NearbySearchResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("nearby search body: {}", e)))?;

        match parsed.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(parsed),
            other => Err(ApiError::from_body_status(other, parsed.error_message.as_deref())),
        }
    }

    async fn details_url_once(&self, place_id: &str) -> std::result::Result<Option<String>, ApiError> {
        let url = format!("{}/details/json", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("place_id", place_id),
                ("fields", "url"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(Self::send_error)?;

        let response = Self::check_response(response).await?;
        let text = response.text().await.map_err(Self::send_error)?;
        let parsed: PlaceDetailsResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("place details body: {}", e)))?;

        match parsed.status.as_str() {
            "OK" => Ok(parsed.result.and_then(|r| r.url)),
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(None),
            other => Err(ApiError::from_body_status(other, parsed.error_message.as_deref())),
        }
    }

    /// Fill `url` on landmarks inside the query radius.
    async fn attach_urls(
        &self,
        query: &Query,
        landmarks: &mut [Landmark],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let lookups = landmarks.iter().map(|landmark| async move {
            if landmark.url.is_none() && query.contains(&landmark.location) {
                Some(self.details_url_once(&landmark.id).await)
            } else {
                None
            }
        });

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LocateError::Cancelled),
            outcomes = join_all(lookups) => outcomes,
        };

        for (landmark, outcome) in landmarks.iter_mut().zip(outcomes) {
            match outcome {
                Some(Ok(url)) => landmark.url = url,
                Some(Err(e)) => {
                    debug!(place_id = %landmark.id, error = %e, "Place details lookup failed, leaving url empty")
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn photo_once(&self, photo_reference: &str) -> std::result::Result<Option<Vec<u8>>, ApiError> {
        let url = format!("{}/photo", self.base_url);
        let max_width = PHOTO_MAX_WIDTH.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("maxwidth", max_width.as_str()),
                ("photo_reference", photo_reference),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(Self::send_error)?;

        match Self::check_response(response).await {
            Ok(response) => {
                let bytes = response.bytes().await.map_err(Self::send_error)?;
                Ok(Some(bytes.to_vec()))
            }
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run `op` until it succeeds, fails permanently, exhausts the attempt
    /// budget, or `cancel` fires.
    async fn with_retry<T, F, Fut>(&self, what: &str, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LocateError::Cancelled),
                outcome = op() => outcome,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(request = what, attempt, "Places request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    warn!(request = what, error = %e, "Places request rejected");
                    return Err(e.into_rejected());
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(request = what, attempts = attempt, error = %e, "Places service unavailable, giving up");
                    return Err(e.into_unavailable(attempt));
                }
                Err(e) => {
                    let backoff_ms = self.retry.backoff_ms(attempt);
                    warn!(request = what, retry = attempt, backoff_ms = backoff_ms, error = %e, "Transient places failure, backing off");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(LocateError::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PlacesClient for RemotePlacesClient {
    async fn fetch(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<Landmark>> {
        let response = self
            .with_retry("nearby_search", cancel, || self.nearby_once(query))
            .await?;

        let mut landmarks: Vec<Landmark> = response
            .results
            .iter()
            .filter_map(|record| record.to_landmark())
            .collect();
        debug!(
            received = response.results.len(),
            usable = landmarks.len(),
            "Nearby search response received"
        );

        if self.fetch_place_urls {
            self.attach_urls(query, &mut landmarks, cancel).await?;
        }
        Ok(landmarks)
    }

    async fn fetch_image(
        &self,
        image_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        self.with_retry("photo", cancel, || self.photo_once(image_id))
            .await
    }

    fn mode(&self) -> OperatingMode {
        OperatingMode::Production
    }
}
