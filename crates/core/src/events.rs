//! Write-through event mediation and local reads.
//!
//! A write is accepted iff the upstream accepted it and the local replica
//! reflects it. The upstream call strictly precedes the local mutation,
//! so observers of the replica never see a write the upstream rejected.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use calbridge_common::validation::{validate_attendees, validate_time_range, validate_title};
use calbridge_common::{RetryExecutor, RetryPolicy, UpstreamError};
use calbridge_domain::{
    CalbridgeError, Event, EventDraft, EventFilters, EventPage, EventPatch, EventSource,
    EventStatus, Result,
};

use crate::ports::{CalendarApi, EventStore, UpstreamEventWrite};
use crate::token::TokenManager;

pub struct EventService {
    events: Arc<dyn EventStore>,
    calendar: Arc<dyn CalendarApi>,
    tokens: Arc<TokenManager>,
    retry: RetryExecutor,
}

impl EventService {
    pub fn new(
        events: Arc<dyn EventStore>,
        calendar: Arc<dyn CalendarApi>,
        tokens: Arc<TokenManager>,
        retry: RetryExecutor,
    ) -> Self {
        Self { events, calendar, tokens, retry }
    }

    /// Filtered, paginated listing from the local replica.
    pub async fn list(&self, user_id: &str, filters: EventFilters) -> Result<EventPage> {
        self.events.list(user_id, &filters.normalized()).await
    }

    pub async fn get(&self, user_id: &str, event_id: &str) -> Result<Event> {
        self.events
            .get(user_id, event_id)
            .await?
            .ok_or_else(|| CalbridgeError::NotFound(format!("event {event_id} not found")))
    }

    /// Free-text search over title and description.
    pub async fn search(&self, user_id: &str, query: &str, limit: u32) -> Result<EventPage> {
        let trimmed = query.trim();
        if trimmed.chars().count() < 2 {
            return Err(CalbridgeError::Validation(
                "search query must be at least 2 characters".to_string(),
            ));
        }

        let filters = EventFilters {
            limit,
            search: Some(trimmed.to_string()),
            ..EventFilters::default()
        };
        self.events.list(user_id, &filters.normalized()).await
    }

    /// Write-through create: upstream insert first, then the local row
    /// keyed by the upstream-returned identifier.
    #[instrument(skip(self, draft), fields(user_id))]
    pub async fn create(&self, user_id: &str, draft: EventDraft) -> Result<Event> {
        validate_title(&draft.title)?;
        validate_time_range(draft.start, draft.end)?;
        validate_attendees(&draft.attendees)?;

        let timezone = draft.timezone.clone().unwrap_or_else(|| "UTC".to_string());
        let payload = UpstreamEventWrite {
            title: draft.title.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            start: draft.start,
            end: draft.end,
            all_day: draft.is_all_day,
            timezone: timezone.clone(),
            attendees: draft.attendees.clone(),
        };

        let upstream = self
            .upstream_call("events.insert", user_id, |token| {
                let payload = payload.clone();
                let calendar = self.calendar.clone();
                async move { calendar.insert_event(&token, &payload).await }
            })
            .await?;

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            google_event_id: Some(upstream.id.clone()),
            title: draft.title,
            description: draft.description,
            start: draft.start,
            end: draft.end,
            location: draft.location,
            attendees: draft.attendees,
            is_all_day: draft.is_all_day,
            timezone,
            status: EventStatus::Confirmed,
            source: EventSource::Manual,
            created_at: now,
            updated_at: now,
            last_modified: now,
        };

        if let Err(err) = self.events.insert(&event).await {
            // Compensate: the upstream accepted a write the replica could
            // not record, so undo it rather than leave the copies apart.
            warn!(user_id, error = %err, "local insert failed after upstream create, compensating");
            self.compensate_upstream_create(user_id, &upstream.id).await;
            return Err(err);
        }

        info!(user_id, event_id = %event.id, "event created");
        Ok(event)
    }

    /// Write-through update: merge the sparse patch over the stored row,
    /// send the complete representation upstream, then persist.
    #[instrument(skip(self, patch), fields(user_id, event_id))]
    pub async fn update(&self, user_id: &str, event_id: &str, patch: EventPatch) -> Result<Event> {
        let existing = self.get(user_id, event_id).await?;
        let merged = apply_patch(existing, patch);

        validate_title(&merged.title)?;
        validate_time_range(merged.start, merged.end)?;
        validate_attendees(&merged.attendees)?;

        if let Some(google_event_id) = merged.google_event_id.clone() {
            let payload = UpstreamEventWrite {
                title: merged.title.clone(),
                description: merged.description.clone(),
                location: merged.location.clone(),
                start: merged.start,
                end: merged.end,
                all_day: merged.is_all_day,
                timezone: merged.timezone.clone(),
                attendees: merged.attendees.clone(),
            };

            self.upstream_call("events.update", user_id, |token| {
                let payload = payload.clone();
                let google_event_id = google_event_id.clone();
                let calendar = self.calendar.clone();
                async move { calendar.update_event(&token, &google_event_id, &payload).await }
            })
            .await?;
        }

        let now = Utc::now();
        let merged = Event { updated_at: now, last_modified: now, ..merged };
        self.events.update(&merged).await?;

        info!(user_id, event_id, "event updated");
        Ok(merged)
    }

    /// Write-through delete. Upstream 404/410 counts as success: the goal
    /// state is "gone on both sides".
    #[instrument(skip(self), fields(user_id, event_id))]
    pub async fn delete(&self, user_id: &str, event_id: &str) -> Result<()> {
        let existing = self.get(user_id, event_id).await?;

        if let Some(google_event_id) = existing.google_event_id.clone() {
            let result = self
                .upstream_call("events.delete", user_id, |token| {
                    let google_event_id = google_event_id.clone();
                    let calendar = self.calendar.clone();
                    async move { calendar.delete_event(&token, &google_event_id).await }
                })
                .await;

            match result {
                Ok(()) => {}
                Err(CalbridgeError::NotFound(_)) => {
                    info!(user_id, event_id, "upstream event already gone");
                }
                Err(err) => return Err(err),
            }
        }

        self.events.delete(user_id, event_id).await?;
        info!(user_id, event_id, "event deleted");
        Ok(())
    }

    /// Run an upstream call with a valid token, allowing one retry after
    /// a forced refresh when the upstream reports an auth failure (the
    /// token may expire between `ensure_valid` and the call landing).
    async fn upstream_call<T, F, Fut>(
        &self,
        operation: &str,
        user_id: &str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        let policy = RetryPolicy::upstream();
        let access = self.tokens.ensure_valid(user_id).await?;

        match self.retry.execute(operation, &policy, || call(access.clone())).await {
            Ok(value) => Ok(value),
            Err(UpstreamError::AuthFailed(_)) => {
                warn!(user_id, operation, "auth failure on live token, forcing refresh");
                let refreshed = self.tokens.refresh(user_id).await?;
                self.retry
                    .execute(operation, &policy, || call(refreshed.access_token.clone()))
                    .await
                    .map_err(Into::into)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn compensate_upstream_create(&self, user_id: &str, google_event_id: &str) {
        let result = self
            .upstream_call("events.delete", user_id, |token| {
                let google_event_id = google_event_id.to_string();
                let calendar = self.calendar.clone();
                async move { calendar.delete_event(&token, &google_event_id).await }
            })
            .await;

        if let Err(err) = result {
            warn!(
                user_id,
                google_event_id,
                error = %err,
                "compensating upstream delete failed; next sync will reconcile"
            );
        }
    }
}

/// Merge a sparse patch over a stored event; untouched fields keep their
/// values.
fn apply_patch(existing: Event, patch: EventPatch) -> Event {
    Event {
        title: patch.title.unwrap_or(existing.title),
        description: patch.description.or(existing.description),
        start: patch.start.unwrap_or(existing.start),
        end: patch.end.unwrap_or(existing.end),
        location: patch.location.or(existing.location),
        attendees: patch.attendees.unwrap_or(existing.attendees),
        is_all_day: patch.is_all_day.unwrap_or(existing.is_all_day),
        timezone: patch.timezone.unwrap_or(existing.timezone),
        status: patch.status.unwrap_or(existing.status),
        ..existing
    }
}
