//! Application state wiring.

use std::sync::Arc;

use calbridge_common::{RetryExecutor, TokenVault, UpstreamMetrics};
use calbridge_core::{
    EventService, OAuthOrchestrator, SessionSigner, SyncEngine, TokenManager, WebhookService,
};
use calbridge_domain::{AppConfig, Result};
use calbridge_infra::database::{
    SqliteEventStore, SqliteOAuthStateStore, SqlitePool, SqlitePoolConfig,
    SqliteSyncCursorStore, SqliteUserStore, SqliteWebhookStore,
};
use calbridge_infra::google::{GoogleCalendarClient, GoogleOAuthClient};
use calbridge_infra::maintenance::{Sweeper, SyncScheduler};

/// Shared handle cloned into every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionSigner>,
    pub tokens: Arc<TokenManager>,
    pub orchestrator: Arc<OAuthOrchestrator>,
    pub events: Arc<EventService>,
    pub sync: Arc<SyncEngine>,
    pub webhooks: Arc<WebhookService>,
    pub metrics: Arc<UpstreamMetrics>,
    pub sweeper: Arc<Sweeper>,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    /// Wire stores, upstream clients, and services from configuration.
    pub fn build(config: AppConfig) -> Result<Self> {
        let pool = SqlitePool::new(
            &config.database.path,
            SqlitePoolConfig {
                max_size: config.database.pool_size,
                connection_timeout: std::time::Duration::from_secs(
                    config.database.connection_timeout_secs,
                ),
            },
        )?;

        let users = Arc::new(SqliteUserStore::new(pool.clone()));
        let events_store = Arc::new(SqliteEventStore::new(pool.clone()));
        let cursors = Arc::new(SqliteSyncCursorStore::new(pool.clone()));
        let states = Arc::new(SqliteOAuthStateStore::new(pool.clone()));
        let webhook_store = Arc::new(SqliteWebhookStore::new(pool));

        let calendar = Arc::new(
            GoogleCalendarClient::new()
                .map_err(|e| calbridge_domain::CalbridgeError::Config(e.to_string()))?,
        );
        let oauth = Arc::new(
            GoogleOAuthClient::new(config.google.clone())
                .map_err(|e| calbridge_domain::CalbridgeError::Config(e.to_string()))?,
        );

        let metrics = Arc::new(UpstreamMetrics::new());
        let retry = RetryExecutor::new(metrics.clone());
        let vault = Arc::new(TokenVault::from_secret(&config.auth.session_secret)?);
        let sessions =
            Arc::new(SessionSigner::new(&config.auth.jwt_secret, config.auth.jwt_lifetime_hours));

        let tokens = Arc::new(TokenManager::new(
            users.clone(),
            oauth.clone(),
            vault,
            retry.clone(),
        ));

        let orchestrator = Arc::new(OAuthOrchestrator::new(
            users.clone(),
            states.clone(),
            oauth,
            tokens.clone(),
            sessions.clone(),
            retry.clone(),
        ));

        let events = Arc::new(EventService::new(
            events_store.clone(),
            calendar.clone(),
            tokens.clone(),
            retry.clone(),
        ));

        let sync = Arc::new(SyncEngine::new(
            events_store,
            cursors.clone(),
            calendar.clone(),
            tokens.clone(),
            retry.clone(),
        ));

        let webhook_callback = format!(
            "{}/api/v1/calendar/webhook",
            config.server.public_url.trim_end_matches('/')
        );
        let webhooks = Arc::new(WebhookService::new(
            webhook_store.clone(),
            calendar,
            tokens.clone(),
            sync.clone(),
            retry,
            webhook_callback,
        ));

        let sweeper = Arc::new(Sweeper::new(
            states,
            webhook_store,
            cursors.clone(),
            std::time::Duration::from_secs(300),
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            users,
            cursors,
            sync.clone(),
            std::time::Duration::from_secs(900),
        ));

        Ok(Self {
            config: Arc::new(config),
            sessions,
            tokens,
            orchestrator,
            events,
            sync,
            webhooks,
            metrics,
            sweeper,
            scheduler,
        })
    }
}
