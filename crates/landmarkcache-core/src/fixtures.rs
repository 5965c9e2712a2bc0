//! Deterministic landmark and image data for test mode.
//!
//! The fixture set is built once from configuration and never mutated; every
//! lookup against it is pure and in-memory.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::config::{FixtureLandmark, LocatorConfig};
use crate::error::{LocateError, Result};
use crate::geo::{is_within_radius, Coordinate, Query};
use crate::models::Landmark;

#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    landmarks: Vec<Landmark>,
    centers: BTreeMap<String, Query>,
    images: HashMap<String, Vec<u8>>,
}

impl FixtureProvider {
    pub fn new(
        landmarks: Vec<Landmark>,
        centers: BTreeMap<String, Query>,
        images: HashMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            landmarks,
            centers,
            images,
        }
    }

    /// Build from the `fixtures` section, reading image files eagerly.
    pub fn from_config(config: &LocatorConfig) -> Result<Self> {
        let fixtures = &config.fixtures;

        let landmarks = fixtures
            .landmarks
            .iter()
            .map(to_landmark)
            .collect::<Result<Vec<_>>>()?;

        let mut centers = BTreeMap::new();
        for (name, center) in &fixtures.centers {
            let query = Query::new(Coordinate::new(center.lat, center.lon)?, center.radius_meters)?;
            centers.insert(name.clone(), query);
        }

        let mut images = HashMap::with_capacity(fixtures.images.len());
        for (id, path) in &fixtures.images {
            let path = config.resolve_fixture_path(path);
            let bytes = std::fs::read(&path).map_err(|e| {
                LocateError::Config(format!(
                    "Failed to read fixture image '{}' from {}: {}",
                    id,
                    path.display(),
                    e
                ))
            })?;
            images.insert(id.clone(), bytes);
        }

        debug!(
            landmarks = landmarks.len(),
            centers = centers.len(),
            images = images.len(),
            "Fixture set loaded"
        );

        Ok(Self::new(landmarks, centers, images))
    }

    /// Fixture landmarks inside the query radius, in declaration order.
    pub fn lookup(&self, query: &Query) -> Vec<Landmark> {
        self.landmarks
            .iter()
            .filter(|l| is_within_radius(&l.location, query))
            .cloned()
            .collect()
    }

    /// The declared query for a named fixture center.
    pub fn center(&self, name: &str) -> Option<Query> {
        self.centers.get(name).copied()
    }

    pub fn center_names(&self) -> impl Iterator<Item = &str> {
        self.centers.keys().map(String::as_str)
    }

    pub fn image(&self, image_id: &str) -> Option<&[u8]> {
        self.images.get(image_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

fn to_landmark(fixture: &FixtureLandmark) -> Result<Landmark> {
    let location = Coordinate::new(fixture.lat, fixture.lon)?;
    let mut landmark = Landmark::new(fixture.id.clone(), fixture.name.clone(), location);
    landmark.categories = fixture.categories.clone();
    landmark.image_refs = fixture.image_refs.clone();
    landmark.summary = Some(
        fixture
            .summary
            .clone()
            .unwrap_or_else(|| format!("Test summary for {}", fixture.name)),
    );
    landmark.url = fixture.url.clone();
    landmark.raw_metadata = serde_json::to_value(fixture).unwrap_or_default();
    Ok(landmark)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureCenter;
    use std::path::PathBuf;

    fn fixture(id: &str, lat: f64, lon: f64) -> FixtureLandmark {
        FixtureLandmark {
            id: id.to_string(),
            name: id.to_uppercase(),
            lat,
            lon,
            categories: vec!["landmark".to_string()],
            image_refs: vec![format!("{}-photo", id)],
            summary: None,
            url: None,
        }
    }

    fn config() -> LocatorConfig {
        let mut config = LocatorConfig::default();
        config.fixtures.centers.insert(
            "plaza".to_string(),
            FixtureCenter {
                lat: 10.0,
                lon: 20.0,
                radius_meters: 500.0,
            },
        );
        config.fixtures.landmarks = vec![
            fixture("near", 10.002, 20.0),
            fixture("far", 10.0054, 20.0),
            fixture("center", 10.0, 20.0),
        ];
        config
    }

    #[test]
    fn test_lookup_filters_by_radius_in_declaration_order() {
        let provider = FixtureProvider::from_config(&config()).unwrap();
        let query = provider.center("plaza").unwrap();

        let ids: Vec<String> = provider.lookup(&query).into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["near".to_string(), "center".to_string()]);
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let provider = FixtureProvider::from_config(&config()).unwrap();
        let query = provider.center("plaza").unwrap();
        assert_eq!(provider.lookup(&query), provider.lookup(&query));
    }

    #[test]
    fn test_summary_defaults_to_test_text() {
        let provider = FixtureProvider::from_config(&config()).unwrap();
        let query = provider.center("plaza").unwrap();
        let first = &provider.lookup(&query)[0];
        assert_eq!(first.summary.as_deref(), Some("Test summary for NEAR"));
        assert_eq!(first.image_refs, vec!["near-photo".to_string()]);
    }

    #[test]
    fn test_images_loaded_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("near.jpg");
        std::fs::write(&image_path, b"\xff\xd8fixture").unwrap();

        let mut config = config();
        config
            .fixtures
            .images
            .insert("near-photo".to_string(), image_path);

        let provider = FixtureProvider::from_config(&config).unwrap();
        assert_eq!(provider.image("near-photo"), Some(&b"\xff\xd8fixture"[..]));
        assert_eq!(provider.image("missing"), None);
    }

    #[test]
    fn test_missing_image_file_is_config_error() {
        let mut config = config();
        config
            .fixtures
            .images
            .insert("ghost".to_string(), PathBuf::from("/nonexistent/ghost.jpg"));

        let err = FixtureProvider::from_config(&config).unwrap_err();
        assert!(matches!(err, LocateError::Config(_)));
    }

    #[test]
    fn test_unknown_center() {
        let provider = FixtureProvider::from_config(&config()).unwrap();
        assert!(provider.center("atlantis").is_none());
        assert_eq!(provider.center_names().collect::<Vec<_>>(), vec!["plaza"]);
    }
}
