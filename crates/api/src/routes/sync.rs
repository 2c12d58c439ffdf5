//! Synchronization trigger handlers.

use axum::extract::State;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use calbridge_domain::SyncOptions;

use crate::envelope::{ok, ApiResult};
use crate::session::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub full_sync: bool,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub max_results: Option<u32>,
}

/// POST /calendar/sync: on-demand sync for the current user.
pub async fn sync_now(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Option<axum::Json<SyncRequest>>,
) -> ApiResult {
    let request = body.map(|json| json.0).unwrap_or_default();
    let options = SyncOptions {
        full_sync: request.full_sync,
        time_min: request.time_min,
        time_max: request.time_max,
        max_results: request.max_results,
    };

    let outcome = state.sync.sync(&user.user_id, &options).await?;
    Ok(ok(outcome))
}

/// POST /calendar/batch-sync: full backfill two years into the past.
pub async fn batch_sync(State(state): State<AppState>, user: CurrentUser) -> ApiResult {
    let now = Utc::now();
    let options = SyncOptions {
        full_sync: true,
        time_min: Some(now - Duration::days(2 * 365)),
        time_max: Some(now + Duration::days(365)),
        max_results: None,
    };

    let outcome = state.sync.sync(&user.user_id, &options).await?;
    Ok(ok(outcome))
}
