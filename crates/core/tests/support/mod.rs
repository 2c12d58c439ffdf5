//! In-memory mock implementations of the core ports.
//!
//! Enables deterministic scenario tests without a database or network.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use calbridge_common::{RetryExecutor, TokenVault, UpstreamError, UpstreamMetrics};
use calbridge_core::ports::{
    CalendarApi, EventStore, EventsQuery, OAuthApi, OAuthStateStore, StoredCredentials,
    SyncCursorStore, TokenGrant, UpstreamEvent, UpstreamPage, UpstreamEventWrite, UserStore,
    WatchResult, WebhookStore,
};
use calbridge_core::{
    EventService, OAuthOrchestrator, SessionSigner, SyncEngine, TokenCredentials, TokenManager,
    WebhookService,
};
use calbridge_domain::{
    Event, EventFilters, EventPage, OAuthState, Result as DomainResult, SyncCursor,
    UpstreamProfile, User, WebhookSubscription,
};

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MockUserStore {
    pub async fn insert_user(&self, user: User) {
        self.users.lock().await.insert(user.id.clone(), user);
    }

    pub async fn get(&self, user_id: &str) -> Option<User> {
        self.users.lock().await.get(user_id).cloned()
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn find_by_id(&self, user_id: &str) -> DomainResult<Option<User>> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> DomainResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        Ok(self.users.lock().await.values().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: &User) -> DomainResult<()> {
        self.users.lock().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_profile(&self, user_id: &str, profile: &UpstreamProfile) -> DomainResult<()> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.google_id = Some(profile.google_id.clone());
            user.display_name = profile.display_name.clone();
            user.picture_url = profile.picture_url.clone();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn store_credentials(
        &self,
        user_id: &str,
        credentials: &StoredCredentials,
    ) -> DomainResult<()> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.access_token_enc = Some(credentials.access_token_enc.clone());
            if let Some(refresh) = &credentials.refresh_token_enc {
                user.refresh_token_enc = Some(refresh.clone());
            }
            user.token_expiry = Some(credentials.expiry);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_credentials(&self, user_id: &str) -> DomainResult<()> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.access_token_enc = None;
            user.refresh_token_enc = None;
            user.token_expiry = None;
        }
        Ok(())
    }

    async fn list_ids(&self) -> DomainResult<Vec<String>> {
        Ok(self.users.lock().await.keys().cloned().collect())
    }
}

#[derive(Default)]
pub struct MockEventStore {
    events: Mutex<Vec<Event>>,
    /// When set, the next insert fails once (write-through compensation
    /// tests).
    pub fail_next_insert: Mutex<bool>,
}

impl MockEventStore {
    pub async fn all(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn seed(&self, event: Event) {
        self.events.lock().await.push(event);
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn list(&self, user_id: &str, filters: &EventFilters) -> DomainResult<EventPage> {
        let events = self.events.lock().await;
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| filters.start_date.map_or(true, |d| e.start >= d))
            .filter(|e| filters.end_date.map_or(true, |d| e.start <= d))
            .filter(|e| filters.status.map_or(true, |s| e.status == s))
            .filter(|e| filters.source.as_source().map_or(true, |s| e.source == s))
            .filter(|e| {
                filters.search.as_deref().map_or(true, |q| {
                    let q = q.to_lowercase();
                    e.title.to_lowercase().contains(&q)
                        || e.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(&q))
                })
            })
            .cloned()
            .collect();

        matched.sort_by_key(|e| e.start);
        let total = matched.len() as u64;
        let page_events = matched
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit as usize)
            .collect();

        Ok(EventPage { events: page_events, total, page: filters.page, limit: filters.limit })
    }

    async fn get(&self, user_id: &str, event_id: &str) -> DomainResult<Option<Event>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .find(|e| e.user_id == user_id && e.id == event_id)
            .cloned())
    }

    async fn insert(&self, event: &Event) -> DomainResult<()> {
        let mut fail = self.fail_next_insert.lock().await;
        if *fail {
            *fail = false;
            return Err(calbridge_domain::CalbridgeError::Database(
                "injected insert failure".to_string(),
            ));
        }
        drop(fail);
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn update(&self, event: &Event) -> DomainResult<()> {
        let mut events = self.events.lock().await;
        if let Some(slot) =
            events.iter_mut().find(|e| e.user_id == event.user_id && e.id == event.id)
        {
            *slot = event.clone();
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, event_id: &str) -> DomainResult<bool> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| !(e.user_id == user_id && e.id == event_id));
        Ok(events.len() < before)
    }

    async fn find_by_google_id(
        &self,
        user_id: &str,
        google_event_id: &str,
    ) -> DomainResult<Option<Event>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .find(|e| {
                e.user_id == user_id && e.google_event_id.as_deref() == Some(google_event_id)
            })
            .cloned())
    }

    async fn upsert_by_google_id(&self, event: &Event) -> DomainResult<String> {
        let mut fail = self.fail_next_insert.lock().await;
        if *fail {
            *fail = false;
            return Err(calbridge_domain::CalbridgeError::Database(
                "injected insert failure".to_string(),
            ));
        }
        drop(fail);

        let mut events = self.events.lock().await;
        if let Some(slot) = events.iter_mut().find(|e| {
            e.user_id == event.user_id && e.google_event_id == event.google_event_id
        }) {
            let id = slot.id.clone();
            *slot = Event { id: id.clone(), ..event.clone() };
            Ok(id)
        } else {
            events.push(event.clone());
            Ok(event.id.clone())
        }
    }

    async fn delete_by_google_id(
        &self,
        user_id: &str,
        google_event_id: &str,
    ) -> DomainResult<bool> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| {
            !(e.user_id == user_id && e.google_event_id.as_deref() == Some(google_event_id))
        });
        Ok(events.len() < before)
    }
}

#[derive(Default)]
pub struct MockCursorStore {
    cursors: Mutex<HashMap<String, SyncCursor>>,
}

impl MockCursorStore {
    pub async fn cursor(&self, user_id: &str) -> Option<SyncCursor> {
        self.cursors.lock().await.get(user_id).cloned()
    }

    pub async fn seed(&self, cursor: SyncCursor) {
        self.cursors.lock().await.insert(cursor.user_id.clone(), cursor);
    }
}

#[async_trait]
impl SyncCursorStore for MockCursorStore {
    async fn get(&self, user_id: &str) -> DomainResult<Option<SyncCursor>> {
        Ok(self.cursors.lock().await.get(user_id).cloned())
    }

    async fn try_begin_sync(&self, user_id: &str) -> DomainResult<bool> {
        let mut cursors = self.cursors.lock().await;
        let cursor =
            cursors.entry(user_id.to_string()).or_insert_with(|| SyncCursor::new(user_id));
        if cursor.sync_in_progress {
            return Ok(false);
        }
        cursor.sync_in_progress = true;
        Ok(true)
    }

    async fn complete_sync(&self, user_id: &str, next_token: Option<&str>) -> DomainResult<()> {
        let mut cursors = self.cursors.lock().await;
        if let Some(cursor) = cursors.get_mut(user_id) {
            if let Some(token) = next_token {
                cursor.next_sync_token = Some(token.to_string());
            }
            cursor.sync_in_progress = false;
            cursor.full_sync_completed = true;
            cursor.last_sync_at = Some(Utc::now());
            cursor.last_error = None;
            cursor.consecutive_errors = 0;
        }
        Ok(())
    }

    async fn fail_sync(&self, user_id: &str, error: &str) -> DomainResult<()> {
        let mut cursors = self.cursors.lock().await;
        if let Some(cursor) = cursors.get_mut(user_id) {
            cursor.sync_in_progress = false;
            cursor.last_error = Some(error.to_string());
            cursor.consecutive_errors += 1;
        }
        Ok(())
    }

    async fn clear_token(&self, user_id: &str) -> DomainResult<()> {
        let mut cursors = self.cursors.lock().await;
        if let Some(cursor) = cursors.get_mut(user_id) {
            cursor.next_sync_token = None;
        }
        Ok(())
    }

    async fn reset_stale(&self, _stale_before: DateTime<Utc>) -> DomainResult<usize> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct MockStateStore {
    states: Mutex<HashMap<String, OAuthState>>,
}

#[async_trait]
impl OAuthStateStore for MockStateStore {
    async fn insert(&self, state: &OAuthState) -> DomainResult<()> {
        self.states.lock().await.insert(state.state.clone(), state.clone());
        Ok(())
    }

    async fn consume(&self, state: &str) -> DomainResult<Option<OAuthState>> {
        Ok(self.states.lock().await.remove(state))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut states = self.states.lock().await;
        let before = states.len();
        states.retain(|_, s| s.expires_at > now);
        Ok(before - states.len())
    }
}

#[derive(Default)]
pub struct MockWebhookStore {
    subscriptions: Mutex<Vec<WebhookSubscription>>,
}

impl MockWebhookStore {
    pub async fn seed(&self, subscription: WebhookSubscription) {
        self.subscriptions.lock().await.push(subscription);
    }

    pub async fn all(&self) -> Vec<WebhookSubscription> {
        self.subscriptions.lock().await.clone()
    }
}

#[async_trait]
impl WebhookStore for MockWebhookStore {
    async fn insert(&self, subscription: &WebhookSubscription) -> DomainResult<()> {
        self.subscriptions.lock().await.push(subscription.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        channel_token: &str,
        resource_id: &str,
    ) -> DomainResult<Option<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .lock()
            .await
            .iter()
            .find(|s| s.active && s.token == channel_token && s.resource_id == resource_id)
            .cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .lock()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn deactivate(&self, channel_id: &str) -> DomainResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(sub) = subscriptions.iter_mut().find(|s| s.channel_id == channel_id) {
            sub.active = false;
        }
        Ok(())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut subscriptions = self.subscriptions.lock().await;
        let mut count = 0;
        for sub in subscriptions.iter_mut() {
            if sub.active && sub.is_expired(now) {
                sub.active = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Upstream APIs
// ---------------------------------------------------------------------------

type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

#[derive(Default)]
pub struct MockCalendarApi {
    /// Scripted `events.list` responses, popped per call.
    pub list_responses: Mutex<VecDeque<UpstreamResult<UpstreamPage>>>,
    pub list_queries: Mutex<Vec<EventsQuery>>,
    /// Delay each list call, for concurrency tests.
    pub list_delay: Mutex<Option<Duration>>,
    pub insert_responses: Mutex<VecDeque<UpstreamResult<UpstreamEvent>>>,
    pub inserted: Mutex<Vec<UpstreamEventWrite>>,
    pub update_responses: Mutex<VecDeque<UpstreamResult<UpstreamEvent>>>,
    pub delete_responses: Mutex<VecDeque<UpstreamResult<()>>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockCalendarApi {
    pub async fn push_page(&self, page: UpstreamPage) {
        self.list_responses.lock().await.push_back(Ok(page));
    }

    pub async fn push_list_error(&self, error: UpstreamError) {
        self.list_responses.lock().await.push_back(Err(error));
    }
}

#[async_trait]
impl CalendarApi for MockCalendarApi {
    async fn list_events(
        &self,
        _access_token: &str,
        query: &EventsQuery,
    ) -> UpstreamResult<UpstreamPage> {
        if let Some(delay) = *self.list_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        self.list_queries.lock().await.push(query.clone());
        self.list_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(UpstreamPage::default()))
    }

    async fn insert_event(
        &self,
        _access_token: &str,
        payload: &UpstreamEventWrite,
    ) -> UpstreamResult<UpstreamEvent> {
        self.inserted.lock().await.push(payload.clone());
        self.insert_responses.lock().await.pop_front().unwrap_or_else(|| {
            Ok(upstream_event("upstream-generated", payload.start, payload.end, None))
        })
    }

    async fn update_event(
        &self,
        _access_token: &str,
        event_id: &str,
        payload: &UpstreamEventWrite,
    ) -> UpstreamResult<UpstreamEvent> {
        self.update_responses.lock().await.pop_front().unwrap_or_else(|| {
            Ok(upstream_event(event_id, payload.start, payload.end, Some(Utc::now())))
        })
    }

    async fn delete_event(&self, _access_token: &str, event_id: &str) -> UpstreamResult<()> {
        self.deleted.lock().await.push(event_id.to_string());
        self.delete_responses.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn watch_events(
        &self,
        _access_token: &str,
        _channel_id: &str,
        _channel_token: &str,
        _callback_url: &str,
    ) -> UpstreamResult<WatchResult> {
        Ok(WatchResult {
            resource_id: "resource-1".to_string(),
            resource_uri: None,
            expiration: Some(Utc::now() + chrono::Duration::days(7)),
        })
    }

    async fn stop_channel(
        &self,
        _access_token: &str,
        _channel_id: &str,
        _resource_id: &str,
    ) -> UpstreamResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockOAuthApi {
    pub exchange_responses: Mutex<VecDeque<UpstreamResult<TokenGrant>>>,
    pub refresh_responses: Mutex<VecDeque<UpstreamResult<TokenGrant>>>,
    pub refresh_calls: Mutex<u32>,
    pub refresh_delay: Mutex<Option<Duration>>,
    pub profile: Mutex<Option<UpstreamProfile>>,
    pub revoked: Mutex<Vec<String>>,
}

#[async_trait]
impl OAuthApi for MockOAuthApi {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/auth?state={state}")
    }

    async fn exchange_code(&self, _code: &str) -> UpstreamResult<TokenGrant> {
        self.exchange_responses.lock().await.pop_front().unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: 3600,
            })
        })
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> UpstreamResult<TokenGrant> {
        if let Some(delay) = *self.refresh_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        *self.refresh_calls.lock().await += 1;
        self.refresh_responses.lock().await.pop_front().unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: "access-refreshed".to_string(),
                refresh_token: None,
                expires_in: 3600,
            })
        })
    }

    async fn revoke_token(&self, token: &str) -> UpstreamResult<()> {
        self.revoked.lock().await.push(token.to_string());
        Ok(())
    }

    async fn fetch_profile(&self, _access_token: &str) -> UpstreamResult<UpstreamProfile> {
        Ok(self.profile.lock().await.clone().unwrap_or(UpstreamProfile {
            google_id: "google-1".to_string(),
            email: "user@example.com".to_string(),
            display_name: Some("Test User".to_string()),
            picture_url: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Harness & fixtures
// ---------------------------------------------------------------------------

pub struct Harness {
    pub users: Arc<MockUserStore>,
    pub events: Arc<MockEventStore>,
    pub cursors: Arc<MockCursorStore>,
    pub states: Arc<MockStateStore>,
    pub webhooks: Arc<MockWebhookStore>,
    pub calendar: Arc<MockCalendarApi>,
    pub oauth: Arc<MockOAuthApi>,
    pub vault: Arc<TokenVault>,
    pub tokens: Arc<TokenManager>,
    pub engine: Arc<SyncEngine>,
    pub service: EventService,
    pub orchestrator: OAuthOrchestrator,
    pub webhook_service: WebhookService,
}

pub fn harness() -> Harness {
    let users = Arc::new(MockUserStore::default());
    let events = Arc::new(MockEventStore::default());
    let cursors = Arc::new(MockCursorStore::default());
    let states = Arc::new(MockStateStore::default());
    let webhooks = Arc::new(MockWebhookStore::default());
    let calendar = Arc::new(MockCalendarApi::default());
    let oauth = Arc::new(MockOAuthApi::default());
    let vault = Arc::new(TokenVault::from_secret("scenario-test-secret").unwrap());
    let retry = RetryExecutor::new(Arc::new(UpstreamMetrics::new()));

    let tokens = Arc::new(TokenManager::new(
        users.clone(),
        oauth.clone(),
        vault.clone(),
        retry.clone(),
    ));

    let engine = Arc::new(SyncEngine::new(
        events.clone(),
        cursors.clone(),
        calendar.clone(),
        tokens.clone(),
        retry.clone(),
    ));

    let service =
        EventService::new(events.clone(), calendar.clone(), tokens.clone(), retry.clone());

    let sessions = Arc::new(SessionSigner::new("scenario-jwt-secret", 24 * 7));
    let orchestrator = OAuthOrchestrator::new(
        users.clone(),
        states.clone(),
        oauth.clone(),
        tokens.clone(),
        sessions,
        retry.clone(),
    );

    let webhook_service = WebhookService::new(
        webhooks.clone(),
        calendar.clone(),
        tokens.clone(),
        engine.clone(),
        retry,
        "https://calbridge.example.com/api/v1/calendar/webhook".to_string(),
    );

    Harness {
        users,
        events,
        cursors,
        states,
        webhooks,
        calendar,
        oauth,
        vault,
        tokens,
        engine,
        service,
        orchestrator,
        webhook_service,
    }
}

/// Seed a user with live (unexpired) wrapped credentials.
pub async fn seed_authenticated_user(h: &Harness, user_id: &str) {
    let now = Utc::now();
    h.users
        .insert_user(User {
            id: user_id.to_string(),
            google_id: Some(format!("google-{user_id}")),
            email: format!("{user_id}@example.com"),
            display_name: None,
            picture_url: None,
            access_token_enc: None,
            refresh_token_enc: None,
            token_expiry: None,
            created_at: now,
            updated_at: now,
        })
        .await;

    h.tokens
        .store(
            user_id,
            &TokenCredentials {
                access_token: "live-access".to_string(),
                refresh_token: Some("live-refresh".to_string()),
                expiry: now + chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap();
}

pub fn upstream_event(
    id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    updated: Option<DateTime<Utc>>,
) -> UpstreamEvent {
    UpstreamEvent {
        id: id.to_string(),
        title: format!("Event {id}"),
        description: None,
        location: None,
        start,
        end,
        all_day: false,
        timezone: "UTC".to_string(),
        attendees: vec![],
        tentative: false,
        updated,
    }
}

pub fn slot(hour: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap();
    (start, start + chrono::Duration::hours(1))
}
