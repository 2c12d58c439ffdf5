//! Background maintenance workers.
//!
//! The sweeper garbage-collects expired OAuth states and webhook
//! subscriptions and resets abandoned `running` sync flags. The
//! scheduler drives periodic incremental syncs for eligible users.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use calbridge_core::ports::{OAuthStateStore, SyncCursorStore, UserStore, WebhookStore};
use calbridge_core::SyncEngine;
use calbridge_domain::constants::SYNC_STALE_AFTER_SECS;
use calbridge_domain::{CalbridgeError, SyncOptions};

/// Periodic garbage collection of short-lived rows.
pub struct Sweeper {
    states: Arc<dyn OAuthStateStore>,
    webhooks: Arc<dyn WebhookStore>,
    cursors: Arc<dyn SyncCursorStore>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        states: Arc<dyn OAuthStateStore>,
        webhooks: Arc<dyn WebhookStore>,
        cursors: Arc<dyn SyncCursorStore>,
        interval: Duration,
    ) -> Self {
        Self { states, webhooks, cursors, interval }
    }

    /// Run forever; spawn on the runtime at startup.
    pub async fn run(self: Arc<Self>) {
        info!(interval_secs = self.interval.as_secs(), "sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep_once(&self) {
        let now = Utc::now();

        match self.states.delete_expired(now).await {
            Ok(removed) if removed > 0 => debug!(removed, "expired oauth states removed"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "oauth state sweep failed"),
        }

        match self.webhooks.deactivate_expired(now).await {
            Ok(swept) if swept > 0 => debug!(swept, "expired webhook channels deactivated"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "webhook sweep failed"),
        }

        let stale_before = now - chrono::Duration::seconds(SYNC_STALE_AFTER_SECS);
        match self.cursors.reset_stale(stale_before).await {
            Ok(reset) if reset > 0 => warn!(reset, "stale running syncs reset to idle"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "stale sync sweep failed"),
        }
    }
}

/// Periodic incremental sync across users.
///
/// A user participates once their first full sync completed and while
/// their consecutive-error count stays under the disqualification
/// threshold.
pub struct SyncScheduler {
    users: Arc<dyn UserStore>,
    cursors: Arc<dyn SyncCursorStore>,
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(
        users: Arc<dyn UserStore>,
        cursors: Arc<dyn SyncCursorStore>,
        engine: Arc<SyncEngine>,
        interval: Duration,
    ) -> Self {
        Self { users, cursors, engine, interval }
    }

    pub async fn run(self: Arc<Self>) {
        info!(interval_secs = self.interval.as_secs(), "sync scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick_once().await;
        }
    }

    #[instrument(skip(self))]
    pub async fn tick_once(&self) {
        let user_ids = match self.users.list_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "scheduler could not enumerate users");
                return;
            }
        };

        for user_id in user_ids {
            let cursor = match self.cursors.get(&user_id).await {
                Ok(cursor) => cursor,
                Err(err) => {
                    warn!(user_id, error = %err, "scheduler could not read cursor");
                    continue;
                }
            };

            let eligible = cursor
                .as_ref()
                .map(|c| c.full_sync_completed && !c.sync_in_progress && c.eligible_for_scheduling())
                .unwrap_or(false);
            if !eligible {
                continue;
            }

            match self.engine.sync(&user_id, &SyncOptions::default()).await {
                Ok(outcome) => {
                    debug!(
                        user_id,
                        processed = outcome.processed,
                        "scheduled sync completed"
                    );
                }
                // Lost the flag race to an on-demand sync; harmless.
                Err(CalbridgeError::Conflict(_)) => {}
                Err(err) => warn!(user_id, error = %err, "scheduled sync failed"),
            }
        }
    }
}
