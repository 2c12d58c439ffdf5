//! Upstream provider ports and the sanitized shapes the engine consumes.
//!
//! The infrastructure adapter performs all coercion from the provider's
//! wire format; everything past this boundary sees these records only.
//! Upstream ports return [`UpstreamError`] so callers can route the
//! classified value through the retry executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use calbridge_common::UpstreamError;
use calbridge_domain::{Attendee, UpstreamProfile};

/// A sanitized upstream event with resolved timestamps.
#[derive(Debug, Clone)]
pub struct UpstreamEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub timezone: String,
    pub attendees: Vec<Attendee>,
    pub tentative: bool,
    /// Upstream last-modified instant, used for strictly-newer updates.
    pub updated: Option<DateTime<Utc>>,
}

/// One change entry from an upstream listing.
///
/// Cancelled entries arrive as bare tombstones (id + status) and carry no
/// schedulable fields, hence the dedicated variant.
#[derive(Debug, Clone)]
pub enum UpstreamChange {
    Cancelled { id: String },
    Upserted(UpstreamEvent),
}

/// One page of an upstream events listing.
#[derive(Debug, Clone, Default)]
pub struct UpstreamPage {
    pub changes: Vec<UpstreamChange>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Query parameters for `events.list`.
///
/// A sync token and a time window are mutually exclusive upstream; the
/// engine sets exactly one.
#[derive(Debug, Clone, Default)]
pub struct EventsQuery {
    pub sync_token: Option<String>,
    pub page_token: Option<String>,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub max_results: u32,
}

/// Authoritative payload for upstream event writes.
#[derive(Debug, Clone)]
pub struct UpstreamEventWrite {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub timezone: String,
    pub attendees: Vec<Attendee>,
}

/// Result of registering a push channel.
#[derive(Debug, Clone)]
pub struct WatchResult {
    pub resource_id: String,
    pub resource_uri: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

/// Calendar data-plane operations against the primary calendar.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        query: &EventsQuery,
    ) -> Result<UpstreamPage, UpstreamError>;

    async fn insert_event(
        &self,
        access_token: &str,
        payload: &UpstreamEventWrite,
    ) -> Result<UpstreamEvent, UpstreamError>;

    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        payload: &UpstreamEventWrite,
    ) -> Result<UpstreamEvent, UpstreamError>;

    async fn delete_event(&self, access_token: &str, event_id: &str)
        -> Result<(), UpstreamError>;

    async fn watch_events(
        &self,
        access_token: &str,
        channel_id: &str,
        channel_token: &str,
        callback_url: &str,
    ) -> Result<WatchResult, UpstreamError>;

    async fn stop_channel(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<(), UpstreamError>;
}

/// Tokens returned by the authorization or refresh endpoints.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// OAuth2 control-plane operations.
#[async_trait]
pub trait OAuthApi: Send + Sync {
    /// Authorization URL for the consent screen, CSRF state included.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, UpstreamError>;

    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<TokenGrant, UpstreamError>;

    async fn revoke_token(&self, token: &str) -> Result<(), UpstreamError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<UpstreamProfile, UpstreamError>;
}
