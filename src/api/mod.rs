use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    DirectionsError,
    models::{GeoPoint, LocationSource, Monastery, UserLocation},
    search::{MIN_QUERY_CHARS, PlaceSearch, PlaceSuggestion},
    trip::{TripPlanner, TripSummary},
};

/// Services shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<TripPlanner>,
    pub search: Arc<dyn PlaceSearch>,
}

#[derive(Serialize, Deserialize)]
pub struct ApiMonastery {
    pub slug: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub district: Option<String>,
}

impl From<&Monastery> for ApiMonastery {
    fn from(monastery: &Monastery) -> Self {
        Self {
            slug: monastery.slug.clone(),
            name: monastery.name.clone(),
            latitude: monastery.lat,
            longitude: monastery.lon,
            district: monastery.district.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub monastery: String,
    pub lat: f64,
    pub lon: f64,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/monasteries", get(get_monasteries))
        .route("/trip", get(get_trip))
        .route("/search", get(get_search))
        .with_state(state)
}

fn status_for(err: &DirectionsError) -> StatusCode {
    match err {
        DirectionsError::Validation { .. } => StatusCode::BAD_REQUEST,
        DirectionsError::Api { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn get_monasteries() -> Result<Json<Vec<ApiMonastery>>, StatusCode> {
    let monasteries = Monastery::all().map_err(|e| status_for(&e))?;
    Ok(Json(monasteries.iter().map(ApiMonastery::from).collect()))
}

async fn get_trip(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> Result<Json<TripSummary>, StatusCode> {
    let point = GeoPoint::new(query.lat, query.lon).map_err(|e| status_for(&e))?;
    let mut user = UserLocation::new(point, LocationSource::Manual);
    if let Some(label) = query.label {
        user = user.with_label(label);
    }

    let summary = state
        .planner
        .plan(&query.monastery, &user)
        .await
        .map_err(|e| {
            warn!(error = %e, monastery = %query.monastery, "Trip request failed");
            status_for(&e)
        })?;
    Ok(Json(summary))
}

async fn get_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PlaceSuggestion>>, StatusCode> {
    let text = query.q.trim();
    if text.chars().count() < MIN_QUERY_CHARS {
        return Ok(Json(Vec::new()));
    }
    let suggestions = state.search.search(text).await.map_err(|e| {
        warn!(error = %e, "Place search failed");
        status_for(&e)
    })?;
    Ok(Json(suggestions))
}
