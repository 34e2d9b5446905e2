//! Route fetching through the app's directions proxy
//!
//! One request asks for driving and walking routes together. A failed or
//! malformed answer clears both routes and raises an advisory so callers
//! fall back to great-circle estimates. Nothing is retried: the pairing is
//! only fetched again once the visitor or the destination moves.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::models::{Destination, GeoPoint, RouteResult, TravelMode, UserLocation};
use crate::{DirectionsError, Result};

/// Advisory shown when live routes could not be fetched
pub const ESTIMATES_ONLY_ADVISORY: &str = "Live routes unavailable, showing estimates only";

/// Routes for both supported modes. A missing mode is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutePair {
    pub driving: Option<RouteResult>,
    pub walking: Option<RouteResult>,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn fetch_routes(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<RoutePair>;
}

#[async_trait]
impl<T: RouteProvider + ?Sized> RouteProvider for Arc<T> {
    async fn fetch_routes(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<RoutePair> {
        (**self).fetch_routes(origin, destination).await
    }
}

/// Client for `GET /api/directions`
pub struct DirectionsClient {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRoute {
    mode: String,
    distance_meters: f64,
    duration_seconds: f64,
    polyline: ApiPolyline,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    path: Vec<ApiLatLng>,
}

#[derive(Debug, Deserialize)]
struct ApiLatLng {
    lat: f64,
    lng: f64,
}

impl ApiRoute {
    fn into_route(self) -> Result<(Option<TravelMode>, RouteResult)> {
        if !self.distance_meters.is_finite() || self.distance_meters < 0.0 {
            return Err(DirectionsError::api(format!(
                "route distance {} is not a valid length",
                self.distance_meters
            )));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(DirectionsError::api(format!(
                "route duration {} is not a valid duration",
                self.duration_seconds
            )));
        }

        let coordinates = self
            .polyline
            .path
            .into_iter()
            .map(|p| GeoPoint::new(p.lat, p.lng))
            .collect::<Result<Vec<_>>>()?;

        let mode = match self.mode.to_ascii_lowercase().as_str() {
            "driving" => Some(TravelMode::Driving),
            "walking" => Some(TravelMode::Walking),
            _ => None,
        };

        Ok((
            mode,
            RouteResult {
                coordinates,
                distance_meters: self.distance_meters,
                duration_seconds: self.duration_seconds,
            },
        ))
    }
}

impl ApiResponse {
    fn into_pair(self) -> Result<RoutePair> {
        let mut pair = RoutePair::default();
        for route in self.routes {
            match route.into_route()? {
                (Some(TravelMode::Driving), route) => pair.driving = Some(route),
                (Some(TravelMode::Walking), route) => pair.walking = Some(route),
                (None, _) => debug!("Ignoring route for unsupported mode"),
            }
        }
        Ok(pair)
    }
}

impl DirectionsClient {
    pub fn new(client: ClientWithMiddleware, app_base_url: &str) -> Self {
        Self {
            client,
            base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, origin: &GeoPoint, destination: &GeoPoint) -> String {
        format!(
            "{}/api/directions?origin={}&destination={}&modes=driving,walking",
            self.base_url,
            urlencoding::encode(&origin.to_query_pair()),
            urlencoding::encode(&destination.to_query_pair()),
        )
    }
}

#[async_trait]
impl RouteProvider for DirectionsClient {
    #[instrument(name = "fetch_routes", skip(self))]
    async fn fetch_routes(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<RoutePair> {
        let response = self.client.get(self.url(origin, destination)).send().await?;

        if !response.status().is_success() {
            return Err(DirectionsError::api(format!(
                "directions proxy returned {}",
                response.status()
            )));
        }

        let body: ApiResponse = response.json().await.map_err(|e| {
            DirectionsError::api(format!("Failed to parse directions response: {e}"))
        })?;
        body.into_pair()
    }
}

/// Result of a [`RouteCoordinator::refresh`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Routes were fetched and stored
    Fetched,
    /// The request failed; both routes were cleared
    Failed,
    /// Same pairing as the last attempt, nothing requested
    Unchanged,
}

/// Holds the current routes for one visitor/destination pairing
pub struct RouteCoordinator<P> {
    provider: P,
    routes: RoutePair,
    advisory: Option<String>,
    last_pairing: Option<(GeoPoint, GeoPoint)>,
}

impl<P: RouteProvider> RouteCoordinator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            routes: RoutePair::default(),
            advisory: None,
            last_pairing: None,
        }
    }

    /// Fetch routes for a new pairing. Errors never escape; they clear the
    /// routes and set the advisory instead.
    pub async fn refresh(&mut self, user: &UserLocation, destination: &Destination) -> RefreshOutcome {
        let pairing = (user.point, destination.point);
        if self.last_pairing == Some(pairing) {
            return RefreshOutcome::Unchanged;
        }
        self.last_pairing = Some(pairing);

        match self.provider.fetch_routes(&user.point, &destination.point).await {
            Ok(routes) => {
                debug!(
                    driving = routes.driving.is_some(),
                    walking = routes.walking.is_some(),
                    "Routes fetched"
                );
                self.routes = routes;
                self.advisory = None;
                RefreshOutcome::Fetched
            }
            Err(err) => {
                warn!(error = %err, destination = %destination.slug, "Route fetch failed");
                self.routes = RoutePair::default();
                self.advisory = Some(ESTIMATES_ONLY_ADVISORY.to_string());
                RefreshOutcome::Failed
            }
        }
    }

    #[must_use]
    pub fn route(&self, mode: TravelMode) -> Option<&RouteResult> {
        match mode {
            TravelMode::Driving => self.routes.driving.as_ref(),
            TravelMode::Walking => self.routes.walking.as_ref(),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &RoutePair {
        &self.routes
    }

    #[must_use]
    pub fn advisory(&self) -> Option<&str> {
        self.advisory.as_deref()
    }
}
