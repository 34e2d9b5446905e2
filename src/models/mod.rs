//! Data models for the directions library
//!
//! This module contains the core domain models organized by concern:
//! - Location: geographic points and the visitor's position
//! - Route: travel modes and fetched routes
//! - Airport: nearest-airport candidates
//! - Monastery: the bundled dataset and trip destinations

pub mod airport;
pub mod location;
pub mod monastery;
pub mod route;

// Re-export all public types for convenient access
pub use airport::AirportCandidate;
pub use location::{GeoPoint, LocationSource, UserLocation};
pub use monastery::{Destination, Monastery};
pub use route::{RouteResult, TravelMode, TravelProfile};
