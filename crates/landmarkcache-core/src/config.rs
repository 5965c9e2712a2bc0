//! Locator configuration management.
//!
//! A single JSON document supplies the operating mode, API credentials,
//! TTLs, retry/backoff parameters and, for test mode, the fixture landmark
//! and center definitions.
//!
//! Configuration is stored at `~/.config/landmarkcache/config.json`.
//! `LANDMARKCACHE_MODE` and `PLACES_API_KEY` (also read from `.env`)
//! override the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::geo::Coordinate;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "landmarkcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable selecting the operating mode (`test` or `production`)
pub const MODE_ENV: &str = "LANDMARKCACHE_MODE";

/// Environment variable carrying the places API key
pub const API_KEY_ENV: &str = "PLACES_API_KEY";

/// Base URL of the places web service.
pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

/// Landmark metadata is considered stale after 1 hour.
const DEFAULT_LANDMARK_TTL_SECS: u64 = 60 * 60;

/// Images change rarely; keep them for a week.
const DEFAULT_IMAGE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// The places service refuses radii above 50 km.
const DEFAULT_MAX_RADIUS_METERS: f64 = 50_000.0;

/// Place types requested from the nearby search.
pub const DEFAULT_PLACE_TYPES: [&str; 4] = ["tourist_attraction", "landmark", "museum", "park"];

/// Which places client and cache namespace the process runs against.
/// Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Production,
    Test,
}

impl OperatingMode {
    /// Cache namespace directory name for this mode.
    pub fn namespace(&self) -> &'static str {
        match self {
            OperatingMode::Production => "production",
            OperatingMode::Test => "test",
        }
    }

}

impl FromStr for OperatingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(OperatingMode::Production),
            "test" | "1" => Ok(OperatingMode::Test),
            other => bail!("Unknown operating mode '{}'", other),
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1000,
            max_backoff_ms: 16_000,
            request_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based), doubling and capped.
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let exp = retry.saturating_sub(1).min(32);
        self.initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms)
    }
}

/// A named fixture center with its search radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCenter {
    pub lat: f64,
    pub lon: f64,
    pub radius_meters: f64,
}

/// A statically declared landmark served in test mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLandmark {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub image_refs: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub centers: BTreeMap<String, FixtureCenter>,
    /// Declaration order is the order fixture lookups return.
    pub landmarks: Vec<FixtureLandmark>,
    /// Image id to file path (relative paths resolve against the config file).
    pub images: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub mode: OperatingMode,
    pub api_key: Option<String>,
    pub places_base_url: String,
    pub cache_root: Option<PathBuf>,
    pub landmark_ttl_secs: u64,
    pub image_ttl_secs: u64,
    pub max_radius_meters: f64,
    /// Joined with `|` into the nearby search `type` filter; empty sends none.
    pub place_types: Vec<String>,
    /// Look up each result's canonical page URL through the details endpoint.
    pub fetch_place_urls: bool,
    pub retry: RetryConfig,
    pub fixtures: FixtureConfig,

    /// Directory of the file this config was read from.
    #[serde(skip)]
    pub(crate) base_dir: Option<PathBuf>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::default(),
            api_key: None,
            places_base_url: DEFAULT_PLACES_BASE_URL.to_string(),
            cache_root: None,
            landmark_ttl_secs: DEFAULT_LANDMARK_TTL_SECS,
            image_ttl_secs: DEFAULT_IMAGE_TTL_SECS,
            max_radius_meters: DEFAULT_MAX_RADIUS_METERS,
            place_types: DEFAULT_PLACE_TYPES.iter().map(|t| t.to_string()).collect(),
            fetch_place_urls: true,
            retry: RetryConfig::default(),
            fixtures: FixtureConfig::default(),
            base_dir: None,
        }
    }
}

impl LocatorConfig {
    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!(?path, "No config file, using defaults");
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from an explicit file without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Write to the user config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `LANDMARKCACHE_MODE` / `PLACES_API_KEY` style overrides.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(MODE_ENV) {
            match raw.parse::<OperatingMode>() {
                Ok(mode) => self.mode = mode,
                Err(e) => warn!(error = %e, "Ignoring unrecognised {}", MODE_ENV),
            }
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }

    /// Root directory holding both cache namespaces.
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(ref root) = self.cache_root {
            return Ok(root.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Cache directory for the configured operating mode.
    pub fn namespace_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_root()?.join(self.mode.namespace()))
    }

    pub fn landmark_ttl(&self) -> Duration {
        Duration::seconds(self.landmark_ttl_secs as i64)
    }

    pub fn image_ttl(&self) -> Duration {
        Duration::seconds(self.image_ttl_secs as i64)
    }

    /// Resolve a fixture image path against the config file location.
    pub fn resolve_fixture_path(&self, path: &Path) -> PathBuf {
        match (&self.base_dir, path.is_relative()) {
            (Some(base), true) => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// API key from config/env, falling back to the OS keychain.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        if let Some(ref key) = self.api_key {
            return Ok(Some(key.clone()));
        }
        CredentialStore::get_api_key()
    }

    pub fn validate(&self) -> Result<()> {
        if self.landmark_ttl_secs == 0 {
            bail!("landmark_ttl_secs must be greater than zero");
        }
        if self.image_ttl_secs == 0 {
            bail!("image_ttl_secs must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if !(self.max_radius_meters.is_finite() && self.max_radius_meters > 0.0) {
            bail!("max_radius_meters must be positive");
        }
        for (name, center) in &self.fixtures.centers {
            Coordinate::new(center.lat, center.lon)
                .with_context(|| format!("Invalid fixture center '{}'", name))?;
            if !(center.radius_meters.is_finite() && center.radius_meters > 0.0) {
                bail!("Fixture center '{}' has a non-positive radius", name);
            }
        }
        for landmark in &self.fixtures.landmarks {
            Coordinate::new(landmark.lat, landmark.lon)
                .with_context(|| format!("Invalid fixture landmark '{}'", landmark.id))?;
        }
        Ok(())
    }
}
