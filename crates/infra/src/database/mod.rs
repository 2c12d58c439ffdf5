//! Pooled SQLite persistence layer.

mod event_repository;
mod oauth_state_repository;
mod pool;
mod schema;
mod sync_cursor_repository;
mod user_repository;
mod webhook_repository;

pub use event_repository::SqliteEventStore;
pub use oauth_state_repository::SqliteOAuthStateStore;
pub use pool::{SqlitePool, SqlitePoolConfig};
pub use sync_cursor_repository::SqliteSyncCursorStore;
pub use user_repository::SqliteUserStore;
pub use webhook_repository::SqliteWebhookStore;

use chrono::{DateTime, Utc};

/// Unix-seconds column helper; out-of-range values clamp to the epoch.
pub(crate) fn datetime_from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
