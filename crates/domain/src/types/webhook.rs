//! Webhook subscription and inbound notification types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An upstream push-channel binding for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub channel_id: String,
    pub user_id: String,
    pub resource_id: String,
    pub token: String,
    pub resource_uri: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl WebhookSubscription {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Header fields of an inbound upstream change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    pub resource_state: String,
    pub resource_id: String,
    pub resource_uri: Option<String>,
    pub channel_id: String,
    pub channel_token: Option<String>,
}

impl WebhookNotification {
    /// States that warrant an incremental sync.
    pub fn requests_sync(&self) -> bool {
        matches!(self.resource_state.as_str(), "sync" | "exists")
    }
}
