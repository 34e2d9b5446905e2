//! `monastery-directions` - getting visitors from where they are to Sikkim's monasteries
//!
//! This library provides location acquisition with IP fallback, route
//! fetching through the app's directions proxy, travel time estimates and
//! nearest airport resolution.

pub mod airports;
pub mod api;
pub mod config;
pub mod error;
pub mod estimate;
pub mod geo;
pub mod geocode;
pub mod geolocation;
pub mod logging;
pub mod models;
pub mod routing;
pub mod search;
pub mod shared;
pub mod trip;
pub mod web;

// Re-export core types for public API
pub use airports::{AirportLookup, AirportResolver, OverpassClient};
pub use config::DirectionsConfig;
pub use error::{DirectionsError, GeolocationFailure};
pub use estimate::{format_distance, format_duration};
pub use geocode::{DestinationRefiner, MonasteryGeocoder};
pub use geolocation::{GeolocationAcquirer, HttpIpLocator};
pub use models::{
    AirportCandidate, Destination, GeoPoint, LocationSource, Monastery, RouteResult, TravelMode,
    TravelProfile, UserLocation,
};
pub use routing::{DirectionsClient, RouteCoordinator};
pub use search::{NominatimSearch, SuggestionSearcher};
pub use trip::{TripPlanner, TripSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, DirectionsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
