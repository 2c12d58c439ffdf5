//! SQLite connection pool
//!
//! Provides r2d2-based connection pooling with per-connection pragmas
//! and idempotent schema bootstrap.

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info, instrument};

use calbridge_domain::{CalbridgeError, Result};

use super::schema;
use crate::errors::InfraError;

/// Pool sizing and timeout parameters.
#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self { max_size: 10, connection_timeout: Duration::from_secs(30) }
    }
}

/// Bounded connection pool over a single SQLite database file.
///
/// WAL mode keeps readers unblocked during sync writes; foreign keys
/// enforce the cascade from users to their dependent rows.
#[derive(Debug, Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlitePool {
    /// Create the pool, apply pragmas, and bootstrap the schema.
    #[instrument(skip_all, fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> Result<Self> {
        info!("creating sqlite connection pool");

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            apply_pragmas(conn)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| CalbridgeError::Database(format!("failed to create pool: {e}")))?;

        {
            let conn = pool.get().map_err(InfraError::from)?;
            schema::initialize(&conn)?;
            debug!("schema bootstrap complete");
        }

        info!(pool_size = config.max_size, "sqlite pool created");
        Ok(Self { pool })
    }

    /// In-memory pool for tests. A single shared connection keeps the
    /// in-memory database alive and visible across calls.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            apply_pragmas(conn)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| CalbridgeError::Database(format!("failed to create pool: {e}")))?;

        {
            let conn = pool.get().map_err(InfraError::from)?;
            schema::initialize(&conn)?;
        }

        Ok(Self { pool })
    }

    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| InfraError::from(e).into())
    }
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode reports the resulting mode as a row.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn pool_creation_and_query() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlitePool::new(&db_path, SqlitePoolConfig::default()).unwrap();
        let conn = pool.get().unwrap();

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        SqlitePool::new(&db_path, SqlitePoolConfig::default()).unwrap();
        // Reopening the same file re-runs the bootstrap without error.
        SqlitePool::new(&db_path, SqlitePoolConfig::default()).unwrap();
    }

    #[test]
    fn foreign_keys_cascade_from_users() {
        let pool = SqlitePool::in_memory().unwrap();
        let conn = pool.get().unwrap();

        conn.execute(
            "INSERT INTO users (id, email, created_at, updated_at) VALUES ('u1', 'a@b.co', 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO events (id, user_id, title, start_ts, end_ts, is_all_day, timezone,
                                 status, source, attendees, created_at, updated_at, last_modified)
             VALUES ('e1', 'u1', 't', 0, 1, 0, 'UTC', 'confirmed', 'manual', '[]', 0, 0, 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM users WHERE id = 'u1'", []).unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
