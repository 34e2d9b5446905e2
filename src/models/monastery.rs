//! Monastery dataset and route destinations

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::GeoPoint;
use crate::geo;
use crate::{DirectionsError, Result};

/// Refined coordinates closer than this to the dataset point are ignored
pub const REFINEMENT_THRESHOLD_METERS: f64 = 30.0;

static MONASTERIES: LazyLock<std::result::Result<Vec<Monastery>, String>> = LazyLock::new(|| {
    serde_json::from_str(include_str!("../../data/monasteries.json")).map_err(|e| e.to_string())
});

/// A monastery record from the bundled dataset
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Monastery {
    pub slug: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Free text handed to the geocode service when refining the point
    pub geocode_query: String,
    pub district: Option<String>,
}

impl Monastery {
    #[must_use]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new_unchecked(self.lat, self.lon)
    }

    /// All monasteries in the bundled dataset
    pub fn all() -> Result<&'static [Monastery]> {
        MONASTERIES
            .as_deref()
            .map_err(|e| DirectionsError::config(format!("bundled monastery data is invalid: {e}")))
    }

    /// Look up a monastery by slug, case-insensitively
    pub fn find(slug: &str) -> Result<&'static Monastery> {
        let slug = slug.trim();
        Self::all()?
            .iter()
            .find(|m| m.slug.eq_ignore_ascii_case(slug))
            .ok_or_else(|| DirectionsError::validation(format!("unknown monastery '{slug}'")))
    }
}

/// The point a trip is heading to
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Destination {
    pub slug: String,
    pub name: String,
    /// Coordinates from the dataset
    pub dataset_point: GeoPoint,
    /// Coordinates used for routing, possibly refined
    pub point: GeoPoint,
    /// Free text for the geocode service
    pub geocode_query: String,
    pub refined: bool,
}

impl Destination {
    #[must_use]
    pub fn new(slug: &str, name: &str, point: GeoPoint) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            dataset_point: point,
            point,
            geocode_query: name.to_string(),
            refined: false,
        }
    }

    /// Move to `candidate` if it lies more than 30 m from the dataset point.
    /// Returns whether the destination moved.
    pub fn apply_refinement(&mut self, candidate: GeoPoint) -> bool {
        let offset = geo::distance_meters(&self.dataset_point, &candidate);
        if offset > REFINEMENT_THRESHOLD_METERS {
            self.point = candidate;
            self.refined = true;
            true
        } else {
            false
        }
    }
}

impl From<&Monastery> for Destination {
    fn from(monastery: &Monastery) -> Self {
        Self {
            slug: monastery.slug.clone(),
            name: monastery.name.clone(),
            dataset_point: monastery.point(),
            point: monastery.point(),
            geocode_query: monastery.geocode_query.clone(),
            refined: false,
        }
    }
}
