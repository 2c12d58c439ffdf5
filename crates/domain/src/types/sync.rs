//! Sync cursor state and sync run shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CONSECUTIVE_SYNC_ERRORS;

/// Per-user synchronization cursor.
///
/// `sync_in_progress` is the mutual-exclusion flag: it may only return to
/// false through sync completion or the operator sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub user_id: String,
    pub next_sync_token: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub full_sync_completed: bool,
    pub sync_in_progress: bool,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
}

impl SyncCursor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            next_sync_token: None,
            last_sync_at: None,
            full_sync_completed: false,
            sync_in_progress: false,
            last_error: None,
            consecutive_errors: 0,
        }
    }

    /// Whether the background scheduler should still pick this user up.
    pub fn eligible_for_scheduling(&self) -> bool {
        self.consecutive_errors < MAX_CONSECUTIVE_SYNC_ERRORS
    }
}

/// Options controlling a single sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub full_sync: bool,
    #[serde(default)]
    pub time_min: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_max: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// A classified per-item failure collected during a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItemError {
    pub event_id: Option<String>,
    pub kind: String,
    pub message: String,
}

/// Counts and per-item errors for a completed sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<SyncItemError>,
    pub success: bool,
}
