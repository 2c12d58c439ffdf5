//! SQLite-backed implementation of the WebhookStore port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use calbridge_core::ports::WebhookStore;
use calbridge_domain::{Result, WebhookSubscription};

use super::{datetime_from_ts, SqlitePool};
use crate::errors::InfraError;

const SUBSCRIPTION_COLUMNS: &str =
    "channel_id, user_id, resource_id, token, resource_uri, expires_at, active";

pub struct SqliteWebhookStore {
    pool: SqlitePool,
}

impl SqliteWebhookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_subscription(row: &Row<'_>) -> rusqlite::Result<WebhookSubscription> {
    Ok(WebhookSubscription {
        channel_id: row.get(0)?,
        user_id: row.get(1)?,
        resource_id: row.get(2)?,
        token: row.get(3)?,
        resource_uri: row.get(4)?,
        expires_at: row.get::<_, Option<i64>>(5)?.map(datetime_from_ts),
        active: row.get(6)?,
    })
}

#[async_trait]
impl WebhookStore for SqliteWebhookStore {
    async fn insert(&self, subscription: &WebhookSubscription) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO webhook_subscriptions
                (channel_id, user_id, resource_id, token, resource_uri, expires_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                subscription.channel_id,
                subscription.user_id,
                subscription.resource_id,
                subscription.token,
                subscription.resource_uri,
                subscription.expires_at.map(|t| t.timestamp()),
                subscription.active,
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn find_active(
        &self,
        channel_token: &str,
        resource_id: &str,
    ) -> Result<Option<WebhookSubscription>> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions
                  WHERE token = ?1 AND resource_id = ?2 AND active = 1"
            ),
            params![channel_token, resource_id],
            map_subscription,
        )
        .optional()
        .map_err(|e| InfraError::from(e).into())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<WebhookSubscription>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions WHERE user_id = ?1"
            ))
            .map_err(InfraError::from)?;

        let subscriptions = stmt
            .query_map(params![user_id], map_subscription)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;
        Ok(subscriptions)
    }

    async fn deactivate(&self, channel_id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE webhook_subscriptions SET active = 0 WHERE channel_id = ?1",
            params![channel_id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let deactivated = conn
            .execute(
                "UPDATE webhook_subscriptions
                    SET active = 0
                  WHERE active = 1 AND expires_at IS NOT NULL AND expires_at <= ?1",
                params![now.timestamp()],
            )
            .map_err(InfraError::from)?;

        if deactivated > 0 {
            debug!(deactivated, "expired webhook subscriptions deactivated");
        }
        Ok(deactivated)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn store_with_user(user_id: &str) -> SqliteWebhookStore {
        let pool = SqlitePool::in_memory().unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "INSERT INTO users (id, email, created_at, updated_at) VALUES (?1, ?2, 0, 0)",
                params![user_id, format!("{user_id}@example.com")],
            )
            .unwrap();
        }
        SqliteWebhookStore::new(pool)
    }

    fn subscription(channel_id: &str, user_id: &str) -> WebhookSubscription {
        WebhookSubscription {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            resource_id: "res-1".to_string(),
            token: "secret-token".to_string(),
            resource_uri: None,
            expires_at: Some(Utc::now() + Duration::days(7)),
            active: true,
        }
    }

    #[tokio::test]
    async fn resolves_by_token_and_resource() {
        let store = store_with_user("u1").await;
        store.insert(&subscription("chan-1", "u1")).await.unwrap();

        let found = store.find_active("secret-token", "res-1").await.unwrap().unwrap();
        assert_eq!(found.user_id, "u1");

        assert!(store.find_active("wrong-token", "res-1").await.unwrap().is_none());
        assert!(store.find_active("secret-token", "other-res").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivated_channels_stop_resolving() {
        let store = store_with_user("u1").await;
        store.insert(&subscription("chan-1", "u1")).await.unwrap();

        store.deactivate("chan-1").await.unwrap();
        assert!(store.find_active("secret-token", "res-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_channels_are_swept() {
        let store = store_with_user("u1").await;

        let mut expired = subscription("chan-old", "u1");
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        store.insert(&expired).await.unwrap();
        store.insert(&subscription("chan-live", "u1")).await.unwrap();

        let swept = store.deactivate_expired(Utc::now()).await.unwrap();
        assert_eq!(swept, 1);

        let all = store.find_by_user("u1").await.unwrap();
        let active: Vec<_> = all.iter().filter(|s| s.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].channel_id, "chan-live");
    }
}
