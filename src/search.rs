//! Place search suggestions for picking a starting point by name
//!
//! Every new query supersedes the previous one: the in-flight request is
//! aborted and a generation check keeps late answers from overwriting newer
//! suggestions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::models::{GeoPoint, LocationSource, UserLocation};
use crate::{DirectionsError, Result};

/// Queries shorter than this clear the suggestions without a request
pub const MIN_QUERY_CHARS: usize = 3;
const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceSuggestion {
    pub label: String,
    pub point: GeoPoint,
}

impl PlaceSuggestion {
    #[must_use]
    pub fn into_user_location(self) -> UserLocation {
        UserLocation::new(self.point, LocationSource::Search).with_label(self.label)
    }
}

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<PlaceSuggestion>>;
}

/// Nominatim forward geocoding
pub struct NominatimSearch {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

impl NominatimPlace {
    fn into_suggestion(self) -> Option<PlaceSuggestion> {
        let lat = self.lat.parse::<f64>().ok()?;
        let lon = self.lon.parse::<f64>().ok()?;
        Some(PlaceSuggestion {
            label: self.display_name,
            point: GeoPoint::new(lat, lon).ok()?,
        })
    }
}

impl NominatimSearch {
    pub fn new(client: ClientWithMiddleware, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlaceSearch for NominatimSearch {
    #[instrument(name = "nominatim_search", skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<PlaceSuggestion>> {
        let url = format!(
            "{}/search?format=json&limit={MAX_SUGGESTIONS}&q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DirectionsError::api(format!(
                "Nominatim returned {}",
                response.status()
            )));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| DirectionsError::api(format!("Failed to parse Nominatim response: {e}")))?;

        Ok(places
            .into_iter()
            .filter_map(NominatimPlace::into_suggestion)
            .take(MAX_SUGGESTIONS)
            .collect())
    }
}

/// Latest suggestions and the query they belong to
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuggestionState {
    pub query: String,
    pub suggestions: Vec<PlaceSuggestion>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct SuggestionSearcher {
    search: Arc<dyn PlaceSearch>,
    generation: Arc<AtomicU64>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    state: Arc<watch::Sender<SuggestionState>>,
}

impl SuggestionSearcher {
    pub fn new(search: Arc<dyn PlaceSearch>) -> Self {
        let (state, _) = watch::channel(SuggestionState::default());
        Self {
            search,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Mutex::new(None),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SuggestionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> SuggestionState {
        self.state.borrow().clone()
    }

    /// Start a search for `query`, cancelling whatever was running
    pub fn submit(&self, query: &str) {
        let query = query.trim().to_string();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = in_flight.take() {
            previous.abort();
        }

        if query.chars().count() < MIN_QUERY_CHARS {
            self.state.send_replace(SuggestionState {
                query,
                ..SuggestionState::default()
            });
            return;
        }

        self.state.send_replace(SuggestionState {
            query: query.clone(),
            suggestions: Vec::new(),
            loading: true,
            error: None,
        });

        let search = self.search.clone();
        let current = self.generation.clone();
        let state = self.state.clone();
        *in_flight = Some(tokio::spawn(async move {
            let result = search.search(&query).await;
            if current.load(Ordering::Acquire) != generation {
                debug!(%query, "Dropping superseded search results");
                return;
            }
            let next = match result {
                Ok(suggestions) => SuggestionState {
                    query,
                    suggestions,
                    loading: false,
                    error: None,
                },
                Err(err) => {
                    warn!(error = %err, "Place search failed");
                    SuggestionState {
                        query,
                        suggestions: Vec::new(),
                        loading: false,
                        error: Some(err.user_message()),
                    }
                }
            };
            state.send_replace(next);
        }));
    }

    /// Turn the suggestion at `index` into the visitor's location
    #[must_use]
    pub fn choose(&self, index: usize) -> Option<UserLocation> {
        self.state
            .borrow()
            .suggestions
            .get(index)
            .cloned()
            .map(PlaceSuggestion::into_user_location)
    }
}

impl Drop for SuggestionSearcher {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            if let Some(handle) = in_flight.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct SlowSearch {
        started: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlaceSearch for SlowSearch {
        async fn search(&self, query: &str) -> Result<Vec<PlaceSuggestion>> {
            self.started.lock().unwrap().push(query.to_string());
            let delay = if query.starts_with("Gang") { 500 } else { 50 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.finished.lock().unwrap().push(query.to_string());
            if query == "nowhere" {
                return Err(DirectionsError::api("Nominatim returned 503"));
            }
            Ok(vec![PlaceSuggestion {
                label: format!("{query}, Sikkim"),
                point: GeoPoint::new_unchecked(27.3, 88.4),
            }])
        }
    }

    fn searcher() -> (Arc<SlowSearch>, SuggestionSearcher) {
        let search = Arc::new(SlowSearch {
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
        });
        let searcher = SuggestionSearcher::new(search.clone());
        (search, searcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_query_aborts_stale_request() {
        let (search, searcher) = searcher();

        searcher.submit("Gangtok");
        tokio::time::sleep(Duration::from_millis(10)).await;
        searcher.submit("Pelling");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = searcher.current();
        assert_eq!(state.query, "Pelling");
        assert!(!state.loading);
        assert_eq!(state.suggestions[0].label, "Pelling, Sikkim");
        assert_eq!(*search.started.lock().unwrap(), ["Gangtok", "Pelling"]);
        assert_eq!(*search.finished.lock().unwrap(), ["Pelling"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_query_clears_without_request() {
        let (search, searcher) = searcher();

        searcher.submit("Pelling");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(searcher.current().suggestions.len(), 1);

        searcher.submit(" Pe ");
        let state = searcher.current();
        assert_eq!(state.query, "Pe");
        assert!(state.suggestions.is_empty());
        assert_eq!(search.started.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_search_reports_error() {
        let (_, searcher) = searcher();
        searcher.submit("nowhere");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = searcher.current();
        assert!(state.suggestions.is_empty());
        assert!(state.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_choose_suggestion() {
        let (_, searcher) = searcher();
        searcher.submit("Ravangla");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let location = searcher.choose(0).unwrap();
        assert_eq!(location.source, LocationSource::Search);
        assert_eq!(location.label.as_deref(), Some("Ravangla, Sikkim"));
        assert!(searcher.choose(3).is_none());
    }

    #[test]
    fn test_nominatim_place_parsing() {
        let body = r#"[
            {"display_name": "Gangtok, East Sikkim, India", "lat": "27.3314", "lon": "88.6138"},
            {"display_name": "Broken", "lat": "north", "lon": "88.0"}
        ]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let suggestions: Vec<_> = places.into_iter().filter_map(NominatimPlace::into_suggestion).collect();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].point, GeoPoint::new_unchecked(27.3314, 88.6138));
    }
}
