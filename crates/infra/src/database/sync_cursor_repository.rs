//! SQLite-backed implementation of the SyncCursorStore port.
//!
//! The `sync_in_progress` flag is the per-user mutual exclusion for sync
//! runs; acquisition is a single conditional UPSERT.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};

use calbridge_core::ports::SyncCursorStore;
use calbridge_domain::{Result, SyncCursor};

use super::{datetime_from_ts, SqlitePool};
use crate::errors::InfraError;

pub struct SqliteSyncCursorStore {
    pool: SqlitePool,
}

impl SqliteSyncCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_cursor(row: &Row<'_>) -> rusqlite::Result<SyncCursor> {
    Ok(SyncCursor {
        user_id: row.get(0)?,
        next_sync_token: row.get(1)?,
        last_sync_at: row.get::<_, Option<i64>>(2)?.map(datetime_from_ts),
        full_sync_completed: row.get(3)?,
        sync_in_progress: row.get(4)?,
        last_error: row.get(5)?,
        consecutive_errors: row.get::<_, i64>(6)? as u32,
    })
}

#[async_trait]
impl SyncCursorStore for SqliteSyncCursorStore {
    async fn get(&self, user_id: &str) -> Result<Option<SyncCursor>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT user_id, next_sync_token, last_sync_at, full_sync_completed,
                    sync_in_progress, last_error, consecutive_errors
               FROM sync_cursors WHERE user_id = ?1",
            params![user_id],
            map_cursor,
        )
        .optional()
        .map_err(|e| InfraError::from(e).into())
    }

    #[instrument(skip(self))]
    async fn try_begin_sync(&self, user_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        // The conditional upsert makes the false→true transition atomic:
        // the UPDATE arm only fires while the flag is clear, so exactly
        // one contender observes a changed row.
        let changed = conn
            .execute(
                "INSERT INTO sync_cursors (user_id, sync_in_progress, updated_at)
                 VALUES (?1, 1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET
                    sync_in_progress = 1, updated_at = excluded.updated_at
                 WHERE sync_cursors.sync_in_progress = 0",
                params![user_id, Utc::now().timestamp()],
            )
            .map_err(InfraError::from)?;

        debug!(user_id, acquired = changed > 0, "sync flag acquisition");
        Ok(changed > 0)
    }

    async fn complete_sync(&self, user_id: &str, next_token: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        let now = Utc::now().timestamp();
        conn.execute(
            "UPDATE sync_cursors
                SET next_sync_token = COALESCE(?1, next_sync_token),
                    last_sync_at = ?2,
                    full_sync_completed = 1,
                    sync_in_progress = 0,
                    last_error = NULL,
                    consecutive_errors = 0,
                    updated_at = ?2
              WHERE user_id = ?3",
            params![next_token, now, user_id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn fail_sync(&self, user_id: &str, error: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE sync_cursors
                SET sync_in_progress = 0,
                    last_error = ?1,
                    consecutive_errors = consecutive_errors + 1,
                    updated_at = ?2
              WHERE user_id = ?3",
            params![error, Utc::now().timestamp(), user_id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn clear_token(&self, user_id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE sync_cursors SET next_sync_token = NULL, updated_at = ?1 WHERE user_id = ?2",
            params![Utc::now().timestamp(), user_id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reset_stale(&self, stale_before: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let swept = conn
            .execute(
                "UPDATE sync_cursors
                    SET sync_in_progress = 0,
                        last_error = 'reset: sync exceeded the stale threshold',
                        updated_at = ?1
                  WHERE sync_in_progress = 1 AND updated_at < ?2",
                params![Utc::now().timestamp(), stale_before.timestamp()],
            )
            .map_err(InfraError::from)?;

        if swept > 0 {
            debug!(swept, "stale running cursors reset");
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use super::*;

    async fn store_with_user(user_id: &str) -> SqliteSyncCursorStore {
        let pool = SqlitePool::in_memory().unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "INSERT INTO users (id, email, created_at, updated_at) VALUES (?1, ?2, 0, 0)",
                params![user_id, format!("{user_id}@example.com")],
            )
            .unwrap();
        }
        SqliteSyncCursorStore::new(pool)
    }

    #[tokio::test]
    async fn begin_creates_cursor_and_blocks_second_acquisition() {
        let store = store_with_user("u1").await;

        assert!(store.try_begin_sync("u1").await.unwrap());
        assert!(!store.try_begin_sync("u1").await.unwrap());

        let cursor = store.get("u1").await.unwrap().unwrap();
        assert!(cursor.sync_in_progress);
        assert!(!cursor.full_sync_completed);
    }

    #[tokio::test]
    async fn complete_persists_token_and_resets_errors() {
        let store = store_with_user("u1").await;
        store.try_begin_sync("u1").await.unwrap();
        store.fail_sync("u1", "boom").await.unwrap();
        store.try_begin_sync("u1").await.unwrap();

        store.complete_sync("u1", Some("nst-1")).await.unwrap();

        let cursor = store.get("u1").await.unwrap().unwrap();
        assert_eq!(cursor.next_sync_token.as_deref(), Some("nst-1"));
        assert!(cursor.full_sync_completed);
        assert!(!cursor.sync_in_progress);
        assert_eq!(cursor.consecutive_errors, 0);
        assert!(cursor.last_error.is_none());
        assert!(cursor.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn complete_without_token_keeps_the_stored_one() {
        let store = store_with_user("u1").await;
        store.try_begin_sync("u1").await.unwrap();
        store.complete_sync("u1", Some("nst-1")).await.unwrap();

        store.try_begin_sync("u1").await.unwrap();
        store.complete_sync("u1", None).await.unwrap();

        let cursor = store.get("u1").await.unwrap().unwrap();
        assert_eq!(cursor.next_sync_token.as_deref(), Some("nst-1"));
    }

    #[tokio::test]
    async fn failures_accumulate_until_success() {
        let store = store_with_user("u1").await;

        for n in 1..=3u32 {
            store.try_begin_sync("u1").await.unwrap();
            store.fail_sync("u1", "upstream down").await.unwrap();
            let cursor = store.get("u1").await.unwrap().unwrap();
            assert_eq!(cursor.consecutive_errors, n);
            assert!(!cursor.sync_in_progress);
        }

        store.try_begin_sync("u1").await.unwrap();
        store.complete_sync("u1", Some("nst")).await.unwrap();
        assert_eq!(store.get("u1").await.unwrap().unwrap().consecutive_errors, 0);
    }

    #[tokio::test]
    async fn stale_running_rows_are_swept() {
        let store = store_with_user("u1").await;
        store.try_begin_sync("u1").await.unwrap();

        // Nothing is stale yet.
        let swept =
            store.reset_stale(Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(swept, 0);

        // Everything before "the future" is stale.
        let swept = store.reset_stale(Utc::now() + chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(swept, 1);

        let cursor = store.get("u1").await.unwrap().unwrap();
        assert!(!cursor.sync_in_progress);
        assert!(cursor.last_error.as_deref().unwrap_or_default().contains("stale"));

        // The flag is reacquirable after the sweep.
        assert!(store.try_begin_sync("u1").await.unwrap());
    }
}
