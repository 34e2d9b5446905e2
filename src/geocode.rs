//! Destination refinement through the monastery geocode endpoint

use std::sync::Arc;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::models::{Destination, GeoPoint};
use crate::{DirectionsError, Result};

/// A refined coordinate for a destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeMatch {
    pub point: GeoPoint,
    pub accuracy_meters: Option<f64>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<GeocodeMatch>;
}

#[async_trait]
impl<T: Geocoder + ?Sized> Geocoder for Arc<T> {
    async fn geocode(&self, query: &str) -> Result<GeocodeMatch> {
        (**self).geocode(query).await
    }
}

/// Client for `GET /api/monastery-geocode?q=`
pub struct MonasteryGeocoder {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeocodeResponse {
    lat: f64,
    lng: f64,
    accuracy_meters: Option<f64>,
}

impl MonasteryGeocoder {
    pub fn new(client: ClientWithMiddleware, app_base_url: &str) -> Self {
        Self {
            client,
            base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for MonasteryGeocoder {
    #[instrument(name = "monastery_geocode", skip(self))]
    async fn geocode(&self, query: &str) -> Result<GeocodeMatch> {
        let url = format!(
            "{}/api/monastery-geocode?q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DirectionsError::api(format!(
                "monastery geocode returned {}",
                response.status()
            )));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::api(format!("Failed to parse geocode response: {e}")))?;

        Ok(GeocodeMatch {
            point: GeoPoint::new(body.lat, body.lng)?,
            accuracy_meters: body.accuracy_meters,
        })
    }
}

/// Refines each destination at most once
pub struct DestinationRefiner<G> {
    geocoder: G,
}

impl<G: Geocoder> DestinationRefiner<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }

    /// Look the destination up and move it when the service disagrees by more
    /// than 30 m. Failures keep the dataset point. Already refined
    /// destinations are returned untouched.
    pub async fn refine(&self, mut destination: Destination) -> Destination {
        if destination.refined {
            return destination;
        }

        match self.geocoder.geocode(&destination.geocode_query).await {
            Ok(found) => {
                if destination.apply_refinement(found.point) {
                    info!(
                        destination = %destination.slug,
                        lat = found.point.lat,
                        lon = found.point.lon,
                        accuracy = ?found.accuracy_meters,
                        "Destination refined"
                    );
                } else {
                    debug!(destination = %destination.slug, "Geocode agrees with dataset point");
                }
            }
            Err(err) => {
                warn!(error = %err, destination = %destination.slug, "Destination geocode failed");
            }
        }
        destination
    }
}
