//! Nearest airport lookup around a destination
//!
//! Aerodromes come from an Overpass query. Named, non-heliport entries are
//! ranked with IATA-coded airports first and then by distance. When the
//! query fails a small static list of regional airports stands in.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::geo;
use crate::models::{AirportCandidate, Destination, GeoPoint};
use crate::{DirectionsError, Result};

/// Regional airports used when the POI source is unreachable: (name, IATA, lat, lon)
const FALLBACK_AIRPORTS: [(&str, &str, f64, f64); 2] = [
    ("Pakyong Airport", "PYG", 27.2269, 88.5872),
    ("Bagdogra Airport", "IXB", 26.6812, 88.3286),
];

/// Tags checked for heliport markers
const HELIPORT_TAGS: [&str; 3] = ["aeroway", "aerodrome", "aerodrome:type"];

/// An aerodrome element as returned by the POI source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoiElement {
    pub position: Option<GeoPoint>,
    pub tags: HashMap<String, String>,
}

impl PoiElement {
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }

    #[must_use]
    pub fn iata(&self) -> Option<&str> {
        self.tag("iata")
    }

    /// Substring match on `heli` in the aeroway classification tags
    #[must_use]
    pub fn is_heliport(&self) -> bool {
        HELIPORT_TAGS.iter().any(|key| {
            self.tag(key)
                .is_some_and(|value| value.to_ascii_lowercase().contains("heli"))
        })
    }
}

#[async_trait]
pub trait PoiSource: Send + Sync {
    async fn aerodromes(&self, center: &GeoPoint, radius_km: f64) -> Result<Vec<PoiElement>>;
}

#[async_trait]
impl<T: PoiSource + ?Sized> PoiSource for Arc<T> {
    async fn aerodromes(&self, center: &GeoPoint, radius_km: f64) -> Result<Vec<PoiElement>> {
        (**self).aerodromes(center, radius_km).await
    }
}

/// Overpass interpreter client
pub struct OverpassClient {
    client: ClientWithMiddleware,
    url: String,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl From<OverpassElement> for PoiElement {
    fn from(element: OverpassElement) -> Self {
        let position = match (element.lat, element.lon, element.center) {
            (Some(lat), Some(lon), _) => GeoPoint::new(lat, lon).ok(),
            (_, _, Some(center)) => GeoPoint::new(center.lat, center.lon).ok(),
            _ => None,
        };
        Self {
            position,
            tags: element.tags.unwrap_or_default(),
        }
    }
}

impl OverpassClient {
    pub fn new(client: ClientWithMiddleware, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    fn query(center: &GeoPoint, radius_km: f64) -> String {
        let radius_m = (radius_km * 1000.0).round();
        let around = format!("around:{radius_m},{},{}", center.lat, center.lon);
        format!(
            "[out:json][timeout:25];\n(\n  node[\"aeroway\"=\"aerodrome\"]({around});\n  way[\"aeroway\"=\"aerodrome\"]({around});\n  relation[\"aeroway\"=\"aerodrome\"]({around});\n);\nout center tags;"
        )
    }
}

#[async_trait]
impl PoiSource for OverpassClient {
    #[instrument(name = "overpass_aerodromes", skip(self))]
    async fn aerodromes(&self, center: &GeoPoint, radius_km: f64) -> Result<Vec<PoiElement>> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(Self::query(center, radius_km))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DirectionsError::api(format!(
                "Overpass returned {}",
                response.status()
            )));
        }

        let body: OverpassResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::api(format!("Failed to parse Overpass response: {e}")))?;
        debug!(elements = body.elements.len(), "Overpass answered");

        Ok(body.elements.into_iter().map(PoiElement::from).collect())
    }
}

/// IATA-coded airports first, then nearest first
pub fn compare_airports(a: &AirportCandidate, b: &AirportCandidate) -> Ordering {
    b.has_iata_code()
        .cmp(&a.has_iata_code())
        .then_with(|| a.distance_km.total_cmp(&b.distance_km))
}

pub fn rank_airports(candidates: &mut [AirportCandidate]) {
    candidates.sort_by(compare_airports);
}

/// Turn raw elements into ranked candidates relative to `destination`
#[must_use]
pub fn candidates_from_elements(elements: Vec<PoiElement>, destination: &GeoPoint) -> Vec<AirportCandidate> {
    let mut candidates: Vec<AirportCandidate> = elements
        .into_iter()
        .filter(|element| !element.is_heliport())
        .filter_map(|element| {
            let name = element.name()?.to_string();
            let position = element.position?;
            Some(AirportCandidate {
                name,
                iata_code: element.iata().map(str::to_uppercase),
                position,
                distance_km: geo::distance_km(destination, &position),
            })
        })
        .collect();
    rank_airports(&mut candidates);
    candidates
}

/// The static regional list ranked against `destination`
#[must_use]
pub fn fallback_airports(destination: &GeoPoint) -> Vec<AirportCandidate> {
    let mut candidates: Vec<AirportCandidate> = FALLBACK_AIRPORTS
        .iter()
        .map(|(name, iata, lat, lon)| {
            let position = GeoPoint::new_unchecked(*lat, *lon);
            AirportCandidate {
                name: (*name).to_string(),
                iata_code: Some((*iata).to_string()),
                position,
                distance_km: geo::distance_km(destination, &position),
            }
        })
        .collect();
    rank_airports(&mut candidates);
    candidates
}

/// Airport chosen for a destination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirportLookup {
    pub airport: AirportCandidate,
    /// Whether the static list was used
    pub fallback: bool,
}

pub struct AirportResolver<S> {
    source: S,
    radius_km: f64,
}

impl<S: PoiSource> AirportResolver<S> {
    pub fn new(source: S, radius_km: f64) -> Self {
        Self { source, radius_km }
    }

    /// Best aerodrome near the destination. `Ok(None)` when the source
    /// answered but nothing usable was found.
    pub async fn lookup(&self, destination: &Destination) -> Result<Option<AirportCandidate>> {
        let elements = self
            .source
            .aerodromes(&destination.point, self.radius_km)
            .await?;

        let best = candidates_from_elements(elements, &destination.point)
            .into_iter()
            .next();
        match &best {
            Some(airport) => info!(
                airport = %airport.display_name(),
                distance_km = airport.distance_km,
                "Nearest airport resolved"
            ),
            None => debug!(destination = %destination.slug, "No usable aerodrome in range"),
        }
        Ok(best)
    }

    /// Best aerodrome near the destination, `None` if the lookup failed or found nothing
    pub async fn nearest(&self, destination: &Destination) -> Option<AirportCandidate> {
        match self.lookup(destination).await {
            Ok(best) => best,
            Err(err) => {
                warn!(error = %err, destination = %destination.slug, "Aerodrome lookup failed");
                None
            }
        }
    }

    /// Live result, or the static list when the lookup itself failed
    pub async fn nearest_or_fallback(&self, destination: &Destination) -> Option<AirportLookup> {
        match self.lookup(destination).await {
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
}

/// Nearest entry of the static list
pub fn static_lookup(destination: &Destination) -> Option<AirportLookup> {
    fallback_airports(&destination.point)
        .into_iter()
        .next()
        .map(|airport| AirportLookup {
            airport,
            fallback: true,
        })
}
