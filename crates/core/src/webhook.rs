//! Webhook demultiplexing and push-channel lifecycle.
//!
//! Inbound notifications carry no user session; the caller is
//! authenticated by resolving `(channel token, resource id)` against the
//! active subscriptions.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use calbridge_common::{RetryExecutor, RetryPolicy};
use calbridge_domain::constants::WEBHOOK_SYNC_MAX_RESULTS;
use calbridge_domain::{
    CalbridgeError, Result, SyncOptions, SyncOutcome, WebhookNotification, WebhookSubscription,
};

use crate::ports::{CalendarApi, WebhookStore};
use crate::sync::SyncEngine;
use crate::token::TokenManager;

pub struct WebhookService {
    subscriptions: Arc<dyn WebhookStore>,
    calendar: Arc<dyn CalendarApi>,
    tokens: Arc<TokenManager>,
    sync: Arc<SyncEngine>,
    retry: RetryExecutor,
    /// Public URL the upstream posts notifications to.
    callback_url: String,
}

impl WebhookService {
    pub fn new(
        subscriptions: Arc<dyn WebhookStore>,
        calendar: Arc<dyn CalendarApi>,
        tokens: Arc<TokenManager>,
        sync: Arc<SyncEngine>,
        retry: RetryExecutor,
        callback_url: String,
    ) -> Self {
        Self { subscriptions, calendar, tokens, sync, retry, callback_url }
    }

    /// Resolve an inbound notification to its user and trigger a targeted
    /// incremental sync. Returns `None` for states that need no sync or
    /// when a sync for the user is already in flight.
    #[instrument(skip(self, notification), fields(channel_id = %notification.channel_id))]
    pub async fn handle_notification(
        &self,
        notification: &WebhookNotification,
    ) -> Result<Option<SyncOutcome>> {
        let token = notification.channel_token.as_deref().ok_or_else(|| {
            CalbridgeError::Unauthenticated("notification missing channel token".to_string())
        })?;

        let subscription = self
            .subscriptions
            .find_active(token, &notification.resource_id)
            .await?
            .ok_or_else(|| {
                CalbridgeError::NotFound("no active subscription for notification".to_string())
            })?;

        if !notification.requests_sync() {
            debug!(state = %notification.resource_state, "notification needs no sync");
            return Ok(None);
        }

        let options = SyncOptions {
            max_results: Some(WEBHOOK_SYNC_MAX_RESULTS),
            ..SyncOptions::default()
        };

        match self.sync.sync(&subscription.user_id, &options).await {
            Ok(outcome) => Ok(Some(outcome)),
            // A sync already in flight will observe the same upstream
            // state; nothing is lost by dropping this trigger.
            Err(CalbridgeError::Conflict(_)) => {
                debug!(user_id = %subscription.user_id, "sync already running, skipping trigger");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Register a push channel for the user's primary calendar.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, user_id: &str) -> Result<WebhookSubscription> {
        let access_token = self.tokens.ensure_valid(user_id).await?;
        let channel_id = Uuid::new_v4().to_string();
        let channel_token = generate_channel_token();

        let watch = self
            .retry
            .execute("events.watch", &RetryPolicy::upstream(), || {
                self.calendar.watch_events(
                    &access_token,
                    &channel_id,
                    &channel_token,
                    &self.callback_url,
                )
            })
            .await?;

        let subscription = WebhookSubscription {
            channel_id,
            user_id: user_id.to_string(),
            resource_id: watch.resource_id,
            token: channel_token,
            resource_uri: watch.resource_uri,
            expires_at: watch.expiration,
            active: true,
        };

        self.subscriptions.insert(&subscription).await?;
        info!(user_id, channel_id = %subscription.channel_id, "webhook subscription created");
        Ok(subscription)
    }

    /// Tear down every active channel for the user. Upstream stop
    /// failures are logged; the local row is deactivated regardless.
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, user_id: &str) -> Result<usize> {
        let subscriptions = self.subscriptions.find_by_user(user_id).await?;
        let mut stopped = 0;

        for subscription in subscriptions.into_iter().filter(|s| s.active) {
            if let Ok(access_token) = self.tokens.ensure_valid(user_id).await {
                let result = self
                    .calendar
                    .stop_channel(&access_token, &subscription.channel_id, &subscription.resource_id)
                    .await;
                if let Err(err) = result {
                    warn!(
                        user_id,
                        channel_id = %subscription.channel_id,
                        error = %err,
                        "upstream channel stop failed"
                    );
                }
            }

            self.subscriptions.deactivate(&subscription.channel_id).await?;
            stopped += 1;
        }

        info!(user_id, stopped, "webhook subscriptions deactivated");
        Ok(stopped)
    }
}

fn generate_channel_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
