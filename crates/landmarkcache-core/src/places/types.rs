// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geo::Coordinate;
use crate::models::Landmark;

/// Body of a nearby-search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbySearchResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<PlaceRecord>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Body of a place-details response, restricted to the fields we request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDetailsResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<PlaceDetails>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceDetails {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub place_id: String,
    pub name: String,
    pub geometry: PlaceGeometry,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub photos: Vec<PlacePhoto>,
    #[serde(default)]
    pub vicinity: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceGeometry {
    pub location: PlaceLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacePhoto {
    pub photo_reference: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl PlaceRecord {
    /// Convert to the domain type; records with invalid coordinates are dropped.
    pub fn to_landmark(&self) -> Option<Landmark> {
        let location = match Coordinate::new(self.geometry.location.lat, self.geometry.location.lng) {
            Ok(c) => c,
            Err(e) => {
                warn!(place_id = %self.place_id, error = %e, "Skipping place with invalid location");
                return None;
            }
        };

        let mut landmark = Landmark::new(self.place_id.clone(), self.name.clone(), location);
        landmark.categories = self.types.clone();
        landmark.image_refs = self
            .photos
            .iter()
            .map(|p| p.photo_reference.clone())
            .collect();
        landmark.summary = self.vicinity.clone();
        landmark.rating = self.rating;
        landmark.raw_metadata = serde_json::to_value(self).unwrap_or_default();
        Some(landmark)
    }
}
