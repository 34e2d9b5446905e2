use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::api::{self, AppState};
use crate::config::DirectionsConfig;
use crate::search::NominatimSearch;
use crate::shared;
use crate::trip::TripPlanner;

/// Router serving the JSON API under `/api`
pub fn app(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api::router(state))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors)
}

pub async fn run(config: &DirectionsConfig, port: u16) -> anyhow::Result<()> {
    let clients = shared::http_clients(&config.endpoints)
        .await
        .context("Failed to create HTTP clients")?;
    let planner = TripPlanner::from_config(config)
        .await
        .context("Failed to create trip planner")?;

    let state = AppState {
        planner: Arc::new(planner),
        search: Arc::new(NominatimSearch::new(
            clients.lookup.clone(),
            &config.endpoints.nominatim_url,
        )),
    };
    // Refinement runs before the concurrent route and airport lookups
    let request_timeout = config.endpoints.timeout() * (2 + config.endpoints.lookup_retries);
    let app = app(state, request_timeout);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Web server running at http://localhost:{}", port);
    axum::serve(listener, app).await.context("Web server failed")?;
    Ok(())
}
