//! Event replica handlers: listing, ranges, search, and write-through
//! CRUD.

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use calbridge_domain::constants::DEFAULT_PAGE_LIMIT;
use calbridge_domain::{
    CalbridgeError, EventDraft, EventFilters, EventPatch, EventStatus, SourceFilter,
};

use crate::envelope::{created, ok, ok_with_message, ApiResult};
use crate::session::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<EventStatus>,
    pub source: Option<SourceFilter>,
    pub search: Option<String>,
}

impl ListQuery {
    fn into_filters(self) -> EventFilters {
        EventFilters {
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
            source: self.source.unwrap_or_default(),
            search: self.search,
        }
    }
}

/// GET /calendar/events
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let page = state.events.list(&user.user_id, query.into_filters()).await?;
    Ok(ok(json!({
        "events": page.events,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "total": page.total,
            "hasNext": page.has_next(),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /calendar/events/range/{today|week|month|custom}
pub async fn range(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(range): Path<String>,
    Query(query): Query<RangeQuery>,
) -> ApiResult {
    let (start, end) = resolve_range(&range, query)?;

    let filters = EventFilters {
        page: 1,
        limit: calbridge_domain::constants::MAX_PAGE_LIMIT,
        start_date: Some(start),
        end_date: Some(end),
        ..EventFilters::default()
    };

    let page = state.events.list(&user.user_id, filters).await?;
    Ok(ok(json!({
        "range": range,
        "start": start,
        "end": end,
        "events": page.events,
        "total": page.total,
    })))
}

fn resolve_range(
    range: &str,
    query: RangeQuery,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CalbridgeError> {
    let now = Utc::now();
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);

    match range {
        "today" => Ok((day_start, day_start + Duration::days(1))),
        "week" => {
            // Week starts on Monday.
            let weekday = day_start.weekday().num_days_from_monday() as i64;
            let week_start = day_start - Duration::days(weekday);
            Ok((week_start, week_start + Duration::days(7)))
        }
        "month" => {
            let month_start = day_start - Duration::days(i64::from(day_start.day0()));
            Ok((month_start, month_start + Duration::days(31)))
        }
        "custom" => {
            let start = query.start.ok_or_else(|| {
                CalbridgeError::Validation("custom range requires a start".to_string())
            })?;
            let end = query.end.ok_or_else(|| {
                CalbridgeError::Validation("custom range requires an end".to_string())
            })?;
            if end < start {
                return Err(CalbridgeError::Validation("range end before start".to_string()));
            }
            Ok((start, end))
        }
        other => Err(CalbridgeError::Validation(format!("unknown range: {other}"))),
    }
}

/// GET /calendar/events/{id}
pub async fn get_one(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
) -> ApiResult {
    let event = state.events.get(&user.user_id, &event_id).await?;
    Ok(ok(event))
}

/// POST /calendar/events: write-through create.
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    axum::Json(draft): axum::Json<EventDraft>,
) -> ApiResult {
    let event = state.events.create(&user.user_id, draft).await?;
    Ok(created(event))
}

/// PUT /calendar/events/{id}: write-through sparse update.
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
    axum::Json(patch): axum::Json<EventPatch>,
) -> ApiResult {
    let event = state.events.update(&user.user_id, &event_id, patch).await?;
    Ok(ok(event))
}

/// DELETE /calendar/events/{id}: write-through delete.
pub async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
) -> ApiResult {
    state.events.delete(&user.user_id, &event_id).await?;
    Ok(ok_with_message(json!({}), "event deleted"))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<u32>,
}

/// GET /calendar/search?q=
pub async fn search(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    let page = state
        .events
        .search(&user.user_id, &query.q, query.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
        .await?;
    Ok(ok(json!({ "query": query.q, "events": page.events, "total": page.total })))
}
