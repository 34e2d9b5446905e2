//! Server-side IP geolocation fallback

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::models::{GeoPoint, LocationSource, UserLocation};
use crate::{DirectionsError, Result};

/// Coarse positioning used when the device cannot provide a fix
#[async_trait]
pub trait IpLocator: Send + Sync {
    async fn locate(&self) -> Result<UserLocation>;
}

/// Client for the app's `POST /api/geolocate` endpoint
pub struct HttpIpLocator {
    client: ClientWithMiddleware,
    url: String,
}

#[derive(Debug, Deserialize)]
struct GeolocateResponse {
    location: GeolocateLatLng,
    accuracy: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GeolocateLatLng {
    lat: f64,
    lng: f64,
}

impl HttpIpLocator {
    pub fn new(client: ClientWithMiddleware, app_base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/geolocate", app_base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl IpLocator for HttpIpLocator {
    #[instrument(name = "ip_geolocate", skip(self), fields(url = %self.url))]
    async fn locate(&self) -> Result<UserLocation> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DirectionsError::api(format!(
                "geolocate endpoint returned {}",
                response.status()
            )));
        }

        let body: GeolocateResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::api(format!("Failed to parse geolocate response: {e}")))?;

        let point = GeoPoint::new(body.location.lat, body.location.lng)?;
        debug!(lat = point.lat, lon = point.lon, accuracy = ?body.accuracy, "IP fallback located visitor");

        Ok(UserLocation::new(point, LocationSource::IpFallback)
            .with_accuracy(body.accuracy)
            .with_label("Approximate location"))
    }
}
