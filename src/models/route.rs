//! Travel modes and route results

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Modes the directions proxy can route
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
    Walking,
}

impl TravelMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
        }
    }
}

/// Profiles used for great-circle based estimates
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TravelProfile {
    Car,
    Train,
    Walk,
}

/// A complete route for one travel mode
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteResult {
    /// Polyline to draw, in travel order
    pub coordinates: Vec<GeoPoint>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

impl RouteResult {
    #[must_use]
    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }
}
