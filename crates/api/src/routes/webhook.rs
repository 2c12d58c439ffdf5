//! Push-notification entry point and channel lifecycle.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use calbridge_domain::WebhookNotification;

use crate::envelope::{ok, ok_with_message, ApiResult};
use crate::session::CurrentUser;
use crate::state::AppState;

/// POST /calendar/webhook: upstream change notification.
///
/// Authenticated by channel token, not by user session. Always answers
/// 200: the upstream retries on non-2xx and a malformed or stale
/// notification is not worth a retry storm.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let notification = WebhookNotification {
        resource_state: header(&headers, "x-goog-resource-state").unwrap_or_default(),
        resource_id: header(&headers, "x-goog-resource-id").unwrap_or_default(),
        resource_uri: header(&headers, "x-goog-resource-uri"),
        channel_id: header(&headers, "x-goog-channel-id").unwrap_or_default(),
        channel_token: header(&headers, "x-goog-channel-token"),
    };

    match state.webhooks.handle_notification(&notification).await {
        Ok(Some(outcome)) => {
            debug!(
                channel_id = %notification.channel_id,
                processed = outcome.processed,
                "webhook sync completed"
            );
        }
        Ok(None) => {
            debug!(channel_id = %notification.channel_id, "webhook absorbed without sync");
        }
        Err(err) => {
            warn!(channel_id = %notification.channel_id, error = %err, "webhook handling failed");
        }
    }

    StatusCode::OK
}

/// POST /calendar/webhook/subscribe: register a push channel.
pub async fn subscribe(State(state): State<AppState>, user: CurrentUser) -> ApiResult {
    let subscription = state.webhooks.subscribe(&user.user_id).await?;
    Ok(ok(json!({
        "channelId": subscription.channel_id,
        "resourceId": subscription.resource_id,
        "expiresAt": subscription.expires_at,
    })))
}

/// POST /calendar/webhook/unsubscribe: tear down this user's channels.
pub async fn unsubscribe(State(state): State<AppState>, user: CurrentUser) -> ApiResult {
    let stopped = state.webhooks.unsubscribe(&user.user_id).await?;
    Ok(ok_with_message(json!({ "stopped": stopped }), "webhook channels deactivated"))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}
