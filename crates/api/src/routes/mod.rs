//! `/api/v1` route tree.

mod auth;
mod events;
mod sync;
mod webhook;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Authentication
        .route("/auth/google", get(auth::initiate))
        .route("/auth/google/callback", get(auth::callback))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/status", get(auth::status))
        // Event replica
        .route("/calendar/events", get(events::list).post(events::create))
        .route("/calendar/events/range/:range", get(events::range))
        .route(
            "/calendar/events/:id",
            get(events::get_one).put(events::update).delete(events::remove),
        )
        .route("/calendar/search", get(events::search))
        // Synchronization
        .route("/calendar/sync", post(sync::sync_now))
        .route("/calendar/batch-sync", post(sync::batch_sync))
        // Push channels
        .route("/calendar/webhook", post(webhook::receive))
        .route("/calendar/webhook/subscribe", post(webhook::subscribe))
        .route("/calendar/webhook/unsubscribe", post(webhook::unsubscribe))
}
