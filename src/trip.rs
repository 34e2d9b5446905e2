//! Trip planning for one visitor and one monastery
//!
//! Ties together destination refinement, the directions proxy, the airport
//! resolver and the estimators into a single summary. Refinement and airport
//! results are cached per monastery for the lifetime of the planner.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::airports::{AirportLookup, AirportResolver, OverpassClient, PoiSource, static_lookup};
use crate::config::DirectionsConfig;
use crate::estimate::{self, format_distance, format_duration};
use crate::geo;
use crate::geocode::{DestinationRefiner, Geocoder, MonasteryGeocoder};
use crate::models::{
    AirportCandidate, Destination, GeoPoint, Monastery, TravelProfile, UserLocation,
};
use crate::routing::{DirectionsClient, RouteCoordinator, RoutePair, RouteProvider};
use crate::shared::{self, OnceMap};
use crate::Result;

/// Durations and distances derived from the current location, destination and routes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TripEstimate {
    pub straight_line_km: f64,
    pub driving_km: Option<f64>,
    pub walking_km: Option<f64>,
    pub car_seconds: f64,
    pub train_seconds: f64,
    pub walk_seconds: f64,
}

impl TripEstimate {
    /// Route durations win when present. Otherwise speeds are applied to the
    /// best known distance, which is the driving route's length when one came
    /// back and great-circle otherwise.
    #[must_use]
    pub fn new(origin: &GeoPoint, destination: &GeoPoint, routes: &RoutePair) -> Self {
        let straight_line_km = geo::distance_km(origin, destination);
        let driving_km = routes.driving.as_ref().map(|r| r.distance_km());
        let walking_km = routes.walking.as_ref().map(|r| r.distance_km());
        let best_km = driving_km.unwrap_or(straight_line_km);

        let car_seconds = routes.driving.as_ref().map_or_else(
            || estimate::estimate_for(TravelProfile::Car, best_km),
            |route| route.duration_seconds,
        );
        let walk_seconds = routes.walking.as_ref().map_or_else(
            || estimate::estimate_for(TravelProfile::Walk, best_km),
            |route| route.duration_seconds,
        );

        Self {
            straight_line_km,
            driving_km,
            walking_km,
            car_seconds,
            train_seconds: estimate::estimate_for(TravelProfile::Train, best_km),
            walk_seconds,
        }
    }

    /// Road distance when a driving route exists, otherwise great-circle
    #[must_use]
    pub fn best_distance_km(&self) -> f64 {
        self.driving_km.unwrap_or(self.straight_line_km)
    }
}

/// Destination as shown to the visitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationSummary {
    pub slug: String,
    pub name: String,
    pub point: GeoPoint,
    pub refined: bool,
}

impl From<&Destination> for DestinationSummary {
    fn from(destination: &Destination) -> Self {
        Self {
            slug: destination.slug.clone(),
            name: destination.name.clone(),
            point: destination.point,
            refined: destination.refined,
        }
    }
}

/// Everything the directions view displays for one trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripSummary {
    pub destination: DestinationSummary,
    pub location: UserLocation,
    pub distance: String,
    pub straight_line_distance: String,
    pub car: String,
    pub train: String,
    pub walk: String,
    pub has_driving_route: bool,
    pub has_walking_route: bool,
    pub routes: RoutePair,
    pub advisory: Option<String>,
    pub airport: Option<AirportCandidate>,
    pub airport_is_fallback: bool,
    pub estimate: TripEstimate,
}

pub struct TripPlanner {
    refiner: DestinationRefiner<Arc<dyn Geocoder>>,
    routes: Arc<dyn RouteProvider>,
    airports: AirportResolver<Arc<dyn PoiSource>>,
    destinations: OnceMap<String, Destination>,
    nearest_airports: OnceMap<String, Option<AirportCandidate>>,
}

impl TripPlanner {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        routes: Arc<dyn RouteProvider>,
        pois: Arc<dyn PoiSource>,
        airport_radius_km: f64,
    ) -> Self {
        Self {
            refiner: DestinationRefiner::new(geocoder),
            routes,
            airports: AirportResolver::new(pois, airport_radius_km),
            destinations: OnceMap::new(),
            nearest_airports: OnceMap::new(),
        }
    }

    /// Planner talking to the configured upstream services over the shared clients
    pub async fn from_config(config: &DirectionsConfig) -> Result<Self> {
        let clients = shared::http_clients(&config.endpoints).await?;
        let endpoints = &config.endpoints;

        Ok(Self::new(
            Arc::new(MonasteryGeocoder::new(clients.lookup.clone(), &endpoints.app_base_url)),
            Arc::new(DirectionsClient::new(clients.direct.clone(), &endpoints.app_base_url)),
            Arc::new(OverpassClient::new(clients.lookup.clone(), &endpoints.overpass_url)),
            f64::from(config.airports.search_radius_km),
        ))
    }

    /// Destination for `slug`, refined once per planner
    pub async fn destination(&self, slug: &str) -> Result<Destination> {
        let monastery = Monastery::find(slug)?;
        self.destinations
            .get_or_try_init(&monastery.slug, || async {
                Ok(self.refiner.refine(Destination::from(monastery)).await)
            })
            .await
    }

    /// Nearest airport, served from cache after the first successful lookup.
    /// A failed lookup falls back to the static list and is retried next time.
    pub async fn airport(&self, destination: &Destination) -> Option<AirportLookup> {
        let found = self
            .nearest_airports
            .get_or_try_init(&destination.slug, || self.airports.lookup(destination))
            .await;

        match found {
            Ok(best) => best.map(|airport| AirportLookup {
                airport,
                fallback: false,
            }),
            Err(err) => {
                warn!(error = %err, destination = %destination.slug, "Aerodrome lookup failed, using static list");
                static_lookup(destination)
            }
        }
    }

    /// Build the summary for `user` travelling to the monastery `slug`
    #[instrument(skip(self, user), fields(origin = %user.point.format_coordinates()))]
    pub async fn plan(&self, slug: &str, user: &UserLocation) -> Result<TripSummary> {
        let destination = self.destination(slug).await?;

        let mut coordinator = RouteCoordinator::new(self.routes.clone());
        let (_, airport) = tokio::join!(
            coordinator.refresh(user, &destination),
            self.airport(&destination)
        );

        let routes = coordinator.routes().clone();
        let estimate = TripEstimate::new(&user.point, &destination.point, &routes);
        info!(
            destination = %destination.slug,
            distance_km = estimate.best_distance_km(),
            live_routes = coordinator.advisory().is_none(),
            "Trip planned"
        );

        Ok(TripSummary {
            destination: DestinationSummary::from(&destination),
            location: user.clone(),
            distance: format_distance(estimate.best_distance_km()),
            straight_line_distance: format_distance(estimate.straight_line_km),
            car: format_duration(estimate.car_seconds),
            train: format_duration(estimate.train_seconds),
            walk: format_duration(estimate.walk_seconds),
            has_driving_route: routes.driving.is_some(),
            has_walking_route: routes.walking.is_some(),
            advisory: coordinator.advisory().map(str::to_string),
            airport_is_fallback: airport.as_ref().is_some_and(|a| a.fallback),
            airport: airport.map(|a| a.airport),
            routes,
            estimate,
        })
    }
}
