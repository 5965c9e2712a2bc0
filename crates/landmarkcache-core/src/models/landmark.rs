use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo::{distance_meters, Coordinate, Query};

/// A point of interest returned by a places lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Stable identifier from the source (place id, fixture key).
    pub id: String,
    pub name: String,
    pub location: Coordinate,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Ordered image identifiers, resolvable through `fetch_image`.
    #[serde(default)]
    pub image_refs: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    /// Distance from the query center, filled in by the locator.
    #[serde(default)]
    pub distance_meters: Option<f64>,
    /// Source record as received, kept for front-ends that need extra fields.
    #[serde(default)]
    pub raw_metadata: serde_json::Value,
}

impl Landmark {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: Coordinate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            categories: Vec::new(),
            image_refs: Vec::new(),
            summary: None,
            url: None,
            rating: None,
            distance_meters: None,
            raw_metadata: serde_json::Value::Null,
        }
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_refs.push(image_id.into());
        self
    }

    /// Annotate with the distance from the query center.
    pub fn annotate_distance(&mut self, query: &Query) {
        self.distance_meters = Some(distance_meters(&self.location, &query.center));
    }

    /// Format the distance for display (e.g. "350 m", "1.2 km").
    pub fn display_distance(&self) -> String {
        match self.distance_meters {
            Some(d) if d < 1000.0 => format!("{:.0} m", d),
            Some(d) => format!("{:.1} km", d / 1000.0),
            None => "Unknown".to_string(),
        }
    }
}

/// Remove duplicate ids, keeping the first occurrence in place.
///
/// Image references carried only by a later duplicate are appended to the
/// first occurrence so no resolvable image is lost.
pub fn dedupe_by_id(landmarks: Vec<Landmark>) -> Vec<Landmark> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(landmarks.len());
    let mut unique: Vec<Landmark> = Vec::with_capacity(landmarks.len());

    for landmark in landmarks {
        match index.get(&landmark.id) {
            Some(&pos) => {
                let kept = &mut unique[pos];
                for image in landmark.image_refs {
                    if !kept.image_refs.contains(&image) {
                        kept.image_refs.push(image);
                    }
                }
            }
            None => {
                index.insert(landmark.id.clone(), unique.len());
                unique.push(landmark);
            }
        }
    }

    unique
}
