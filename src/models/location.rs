//! Geographic points and the visitor's current location

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DirectionsError, Result};

/// A WGS84 point in decimal degrees
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude, -90 to 90
    pub lat: f64,
    /// Longitude, -180 to 180
    pub lon: f64,
}

impl GeoPoint {
    /// Create a validated point
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(DirectionsError::validation(format!(
                "coordinates must be finite numbers, got ({lat}, {lon})"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(DirectionsError::validation(format!(
                "latitude {lat} is outside -90..90"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(DirectionsError::validation(format!(
                "longitude {lon} is outside -180..180"
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Create a point from values already known to be in range (dataset constants, parsed fixtures)
    #[must_use]
    pub const fn new_unchecked(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Format as the `lat,lng` pair the directions proxy expects
    #[must_use]
    pub fn to_query_pair(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Where a [`UserLocation`] came from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Fast, low accuracy device fix
    QuickFix,
    /// High accuracy watch update
    Refined,
    /// Server-side IP lookup
    IpFallback,
    /// Chosen from place search suggestions
    Search,
    /// Typed in by the user (CLI flags, query parameters)
    Manual,
}

/// The visitor's position. Replaced wholesale on every new fix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserLocation {
    pub point: GeoPoint,
    /// Display name of the place, when known
    pub label: Option<String>,
    /// Reported accuracy radius in meters
    pub accuracy_meters: Option<f64>,
    pub source: LocationSource,
    pub acquired_at: DateTime<Utc>,
}

impl UserLocation {
    #[must_use]
    pub fn new(point: GeoPoint, source: LocationSource) -> Self {
        Self {
            point,
            label: None,
            accuracy_meters: None,
            source,
            acquired_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_accuracy(mut self, accuracy_meters: Option<f64>) -> Self {
        self.accuracy_meters = accuracy_meters.filter(|a| a.is_finite() && *a >= 0.0);
        self
    }

    #[must_use]
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label to show, falling back to the coordinates
    #[must_use]
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.point.format_coordinates())
    }
}
