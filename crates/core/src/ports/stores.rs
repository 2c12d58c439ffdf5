//! Persistence ports over the relational store.
//!
//! Every method takes the owning user id where ownership applies; an
//! implementation must never return rows owned by another user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use calbridge_domain::{
    Event, EventFilters, EventPage, OAuthState, Result, SyncCursor, UpstreamProfile, User,
    WebhookSubscription,
};

/// Vault-wrapped credential columns for a user row.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub access_token_enc: String,
    /// `None` keeps the currently stored refresh token; the upstream only
    /// reissues refresh tokens on consent.
    pub refresh_token_enc: Option<String>,
    pub expiry: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;
    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn insert(&self, user: &User) -> Result<()>;
    async fn update_profile(&self, user_id: &str, profile: &UpstreamProfile) -> Result<()>;
    async fn store_credentials(&self, user_id: &str, credentials: &StoredCredentials)
        -> Result<()>;
    /// Clears all credential columns; the user row is retained.
    async fn clear_credentials(&self, user_id: &str) -> Result<()>;
    /// Ids of every user, for the background scheduler.
    async fn list_ids(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list(&self, user_id: &str, filters: &EventFilters) -> Result<EventPage>;
    async fn get(&self, user_id: &str, event_id: &str) -> Result<Option<Event>>;
    async fn insert(&self, event: &Event) -> Result<()>;
    /// Full-row update; the caller merges sparse patches beforehand.
    async fn update(&self, event: &Event) -> Result<()>;
    /// Hard delete. Returns whether a row was removed.
    async fn delete(&self, user_id: &str, event_id: &str) -> Result<bool>;
    async fn find_by_google_id(
        &self,
        user_id: &str,
        google_event_id: &str,
    ) -> Result<Option<Event>>;
    /// Insert, or on `(user_id, google_event_id)` conflict replace all
    /// mutable fields and touch `last_modified`. Returns the local id.
    async fn upsert_by_google_id(&self, event: &Event) -> Result<String>;
    async fn delete_by_google_id(&self, user_id: &str, google_event_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait SyncCursorStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<SyncCursor>>;
    /// Atomically transition `sync_in_progress` false→true, creating the
    /// cursor row when absent. Returns `false` when a sync already runs.
    async fn try_begin_sync(&self, user_id: &str) -> Result<bool>;
    /// Successful completion: releases the flag, clears the error state,
    /// marks full-sync completion, and persists `next_token` when one was
    /// returned (a `None` keeps the stored token).
    async fn complete_sync(&self, user_id: &str, next_token: Option<&str>) -> Result<()>;
    /// Failed completion: releases the flag, records the error, and
    /// increments the consecutive-error counter.
    async fn fail_sync(&self, user_id: &str, error: &str) -> Result<()>;
    /// Clears the stored sync token so the next run performs a full sync.
    async fn clear_token(&self, user_id: &str) -> Result<()>;
    /// Operator reset: flips `running` rows older than `stale_before`
    /// back to idle with an error marker. Returns the number swept.
    async fn reset_stale(&self, stale_before: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn insert(&self, state: &OAuthState) -> Result<()>;
    /// One-shot consumption: deletes and returns the row when present.
    async fn consume(&self, state: &str) -> Result<Option<OAuthState>>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, subscription: &WebhookSubscription) -> Result<()>;
    /// Resolve an inbound notification by `(channel token, resource id)`
    /// against active subscriptions.
    async fn find_active(
        &self,
        channel_token: &str,
        resource_id: &str,
    ) -> Result<Option<WebhookSubscription>>;
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<WebhookSubscription>>;
    async fn deactivate(&self, channel_id: &str) -> Result<()>;
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
