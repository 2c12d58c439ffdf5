//! Embedded schema, created idempotently at pool bootstrap.

use rusqlite::Connection;

use calbridge_domain::Result;

use crate::errors::InfraError;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            google_id TEXT UNIQUE,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT,
            picture_url TEXT,
            access_token_enc TEXT,
            refresh_token_enc TEXT,
            token_expiry INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            google_event_id TEXT,
            title TEXT NOT NULL,
            description TEXT,
            start_ts INTEGER NOT NULL,
            end_ts INTEGER NOT NULL,
            location TEXT,
            attendees TEXT NOT NULL DEFAULT '[]',
            is_all_day INTEGER NOT NULL DEFAULT 0,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            status TEXT NOT NULL DEFAULT 'confirmed',
            source TEXT NOT NULL DEFAULT 'manual',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_modified INTEGER NOT NULL,
            UNIQUE(user_id, google_event_id)
        );

        CREATE INDEX IF NOT EXISTS idx_events_user_start ON events(user_id, start_ts);

        CREATE TABLE IF NOT EXISTS sync_cursors (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            next_sync_token TEXT,
            last_sync_at INTEGER,
            full_sync_completed INTEGER NOT NULL DEFAULT 0,
            sync_in_progress INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            consecutive_errors INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS oauth_states (
            state TEXT PRIMARY KEY,
            user_id TEXT,
            expires_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS webhook_subscriptions (
            channel_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            resource_id TEXT NOT NULL,
            token TEXT NOT NULL,
            resource_uri TEXT,
            expires_at INTEGER,
            active INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_webhook_token_resource
            ON webhook_subscriptions(token, resource_id);",
    )
    .map_err(InfraError::from)?;

    Ok(())
}
