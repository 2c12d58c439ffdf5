//! # Calbridge API
//!
//! Axum HTTP surface over the core services: authentication flow,
//! event CRUD, sync triggers, and the webhook entry point.

pub mod envelope;
pub mod routes;
pub mod session;
pub mod state;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::warn;

use state::AppState;

/// Build the application router with every `/api/v1` route mounted.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, COOKIE])
        .allow_credentials(true)
}
