//! Calendar synchronization engine.
//!
//! Reconciles upstream state into the local replica through a full sync
//! (pagination over a time window) or an incremental sync (pagination
//! from a server-issued sync token). A stale-token response degrades
//! incremental to full transparently, within the same run.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use calbridge_common::{RetryExecutor, RetryPolicy, UpstreamError};
use calbridge_domain::constants::SYNC_MAX_RESULTS;
use calbridge_domain::{
    CalbridgeError, Event, EventSource, EventStatus, Result, SyncItemError, SyncOptions,
    SyncOutcome,
};

use crate::ports::{CalendarApi, EventStore, EventsQuery, SyncCursorStore, UpstreamChange,
    UpstreamEvent};
use crate::token::TokenManager;

enum Applied {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

pub struct SyncEngine {
    events: Arc<dyn EventStore>,
    cursors: Arc<dyn SyncCursorStore>,
    calendar: Arc<dyn CalendarApi>,
    tokens: Arc<TokenManager>,
    retry: RetryExecutor,
}

impl SyncEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        cursors: Arc<dyn SyncCursorStore>,
        calendar: Arc<dyn CalendarApi>,
        tokens: Arc<TokenManager>,
        retry: RetryExecutor,
    ) -> Self {
        Self { events, cursors, calendar, tokens, retry }
    }

    /// Run one sync for a user. At most one sync is in flight per user;
    /// a concurrent request fails with a conflict.
    #[instrument(skip(self, options), fields(user_id))]
    pub async fn sync(&self, user_id: &str, options: &SyncOptions) -> Result<SyncOutcome> {
        if !self.cursors.try_begin_sync(user_id).await? {
            return Err(CalbridgeError::Conflict("sync already running".to_string()));
        }

        match self.run_exclusive(user_id, options).await {
            Ok((mut outcome, next_token)) => {
                self.cursors.complete_sync(user_id, next_token.as_deref()).await?;
                outcome.success = true;
                info!(
                    user_id,
                    processed = outcome.processed,
                    created = outcome.created,
                    updated = outcome.updated,
                    deleted = outcome.deleted,
                    item_errors = outcome.errors.len(),
                    "sync completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(user_id, error = %err, "sync failed");
                if let Err(mark_err) = self.cursors.fail_sync(user_id, &err.to_string()).await {
                    warn!(user_id, error = %mark_err, "failed to record sync failure");
                }
                Err(err)
            }
        }
    }

    async fn run_exclusive(
        &self,
        user_id: &str,
        options: &SyncOptions,
    ) -> Result<(SyncOutcome, Option<String>)> {
        let cursor = self.cursors.get(user_id).await?;
        let sync_token = match &cursor {
            Some(c) if c.full_sync_completed && !options.full_sync => c.next_sync_token.clone(),
            _ => None,
        };

        let access_token = self.tokens.ensure_valid(user_id).await?;

        if let Some(token) = sync_token {
            match self.paginate(user_id, &access_token, self.incremental_query(&token, options))
                .await
            {
                Ok(result) => return Ok(result),
                Err(UpstreamError::Gone(_)) => {
                    info!(user_id, "sync token invalidated, falling back to full sync");
                    self.cursors.clear_token(user_id).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.paginate(user_id, &access_token, self.full_query(options))
            .await
            .map_err(Into::into)
    }

    fn incremental_query(&self, sync_token: &str, options: &SyncOptions) -> EventsQuery {
        EventsQuery {
            sync_token: Some(sync_token.to_string()),
            max_results: capped_max_results(options),
            ..EventsQuery::default()
        }
    }

    fn full_query(&self, options: &SyncOptions) -> EventsQuery {
        let now = Utc::now();
        EventsQuery {
            time_min: Some(options.time_min.unwrap_or(now - Duration::days(365))),
            time_max: Some(options.time_max.unwrap_or(now + Duration::days(365))),
            max_results: capped_max_results(options),
            ..EventsQuery::default()
        }
    }

    /// Walk the page-token chain, applying every change. The sync token
    /// from the final page is returned for persistence; a series with
    /// zero items still yields its token.
    async fn paginate(
        &self,
        user_id: &str,
        access_token: &str,
        base_query: EventsQuery,
    ) -> std::result::Result<(SyncOutcome, Option<String>), UpstreamError> {
        let mut outcome = SyncOutcome::default();
        let mut next_sync_token: Option<String> = None;
        let mut page_token: Option<String> = None;

        loop {
            let query = EventsQuery { page_token: page_token.clone(), ..base_query.clone() };
            let page = self
                .retry
                .execute("events.list", &RetryPolicy::background(), || {
                    self.calendar.list_events(access_token, &query)
                })
                .await?;

            for change in page.changes {
                outcome.processed += 1;
                let change_id = change_id(&change);
                match self.apply_change(user_id, change).await {
                    Ok(Applied::Created) => outcome.created += 1,
                    Ok(Applied::Updated) => outcome.updated += 1,
                    Ok(Applied::Deleted) => outcome.deleted += 1,
                    Ok(Applied::Unchanged) => {}
                    Err(err) => {
                        // One bad event must not sink the run.
                        warn!(user_id, event_id = %change_id, error = %err, "event sync failed");
                        outcome.errors.push(SyncItemError {
                            event_id: Some(change_id),
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        });
                    }
                }
            }

            if page.next_sync_token.is_some() {
                next_sync_token = page.next_sync_token;
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok((outcome, next_sync_token))
    }

    async fn apply_change(&self, user_id: &str, change: UpstreamChange) -> Result<Applied> {
        match change {
            UpstreamChange::Cancelled { id } => {
                self.events.delete_by_google_id(user_id, &id).await?;
                Ok(Applied::Deleted)
            }
            UpstreamChange::Upserted(upstream) => {
                match self.events.find_by_google_id(user_id, &upstream.id).await? {
                    None => {
                        // Upsert keyed on the upstream id: a racing insert
                        // from another entry point degrades to a replace.
                        let event = replica_from_upstream(user_id, &upstream);
                        self.events.upsert_by_google_id(&event).await?;
                        Ok(Applied::Created)
                    }
                    Some(existing) => {
                        // Update only when the upstream copy is strictly
                        // newer than what we hold.
                        let newer = upstream
                            .updated
                            .is_some_and(|updated| updated > existing.last_modified);
                        if !newer {
                            return Ok(Applied::Unchanged);
                        }

                        let merged = Event {
                            title: upstream.title.clone(),
                            description: upstream.description.clone(),
                            start: upstream.start,
                            end: upstream.end,
                            location: upstream.location.clone(),
                            attendees: upstream.attendees.clone(),
                            is_all_day: upstream.all_day,
                            timezone: upstream.timezone.clone(),
                            status: upstream_status(&upstream),
                            updated_at: Utc::now(),
                            last_modified: upstream.updated.unwrap_or_else(Utc::now),
                            ..existing
                        };
                        self.events.update(&merged).await?;
                        Ok(Applied::Updated)
                    }
                }
            }
        }
    }
}

fn capped_max_results(options: &SyncOptions) -> u32 {
    options.max_results.unwrap_or(SYNC_MAX_RESULTS).min(SYNC_MAX_RESULTS)
}

fn change_id(change: &UpstreamChange) -> String {
    match change {
        UpstreamChange::Cancelled { id } => id.clone(),
        UpstreamChange::Upserted(event) => event.id.clone(),
    }
}

fn upstream_status(upstream: &UpstreamEvent) -> EventStatus {
    if upstream.tentative {
        EventStatus::Tentative
    } else {
        EventStatus::Confirmed
    }
}

fn replica_from_upstream(user_id: &str, upstream: &UpstreamEvent) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        google_event_id: Some(upstream.id.clone()),
        title: upstream.title.clone(),
        description: upstream.description.clone(),
        start: upstream.start,
        end: upstream.end,
        location: upstream.location.clone(),
        attendees: upstream.attendees.clone(),
        is_all_day: upstream.all_day,
        timezone: upstream.timezone.clone(),
        status: upstream_status(upstream),
        source: EventSource::Google,
        created_at: now,
        updated_at: now,
        last_modified: upstream.updated.unwrap_or(now),
    }
}
