//! SQLite-backed implementation of the OAuthStateStore port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use calbridge_core::ports::OAuthStateStore;
use calbridge_domain::{OAuthState, Result};

use super::{datetime_from_ts, SqlitePool};
use crate::errors::InfraError;

pub struct SqliteOAuthStateStore {
    pool: SqlitePool,
}

impl SqliteOAuthStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStateStore for SqliteOAuthStateStore {
    async fn insert(&self, state: &OAuthState) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO oauth_states (state, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![state.state, state.user_id, state.expires_at.timestamp()],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<Option<OAuthState>> {
        let conn = self.pool.get()?;
        // Read-then-delete inside one transaction keeps consumption
        // one-shot under concurrent callbacks.
        let tx = conn.unchecked_transaction().map_err(InfraError::from)?;

        let row = tx
            .query_row(
                "SELECT state, user_id, expires_at FROM oauth_states WHERE state = ?1",
                params![state],
                |row| {
                    Ok(OAuthState {
                        state: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: datetime_from_ts(row.get(2)?),
                    })
                },
            )
            .optional()
            .map_err(InfraError::from)?;

        if row.is_some() {
            tx.execute("DELETE FROM oauth_states WHERE state = ?1", params![state])
                .map_err(InfraError::from)?;
        }
        tx.commit().map_err(InfraError::from)?;

        Ok(row)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let removed = conn
            .execute("DELETE FROM oauth_states WHERE expires_at <= ?1", params![now.timestamp()])
            .map_err(InfraError::from)?;

        if removed > 0 {
            debug!(removed, "expired oauth states deleted");
        }
        Ok(removed)
    }
}
