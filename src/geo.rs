//! Great-circle distance helpers

use haversine::{Location as HaversineLocation, Units, distance};

use crate::models::GeoPoint;

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn to_haversine(point: &GeoPoint) -> HaversineLocation {
    HaversineLocation {
        latitude: point.lat,
        longitude: point.lon,
    }
}

/// Haversine distance in kilometers. NaN inputs propagate.
#[must_use]
pub fn distance_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    distance(to_haversine(from), to_haversine(to), Units::Kilometers)
}

#[must_use]
pub fn distance_meters(from: &GeoPoint, to: &GeoPoint) -> f64 {
    distance_km(from, to) * 1000.0
}
