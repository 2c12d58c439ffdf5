//! Domain constants shared across crates

/// Refresh access tokens this many seconds before expiry.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// OAuth CSRF state rows expire after this many seconds.
pub const OAUTH_STATE_TTL_SECS: i64 = 600;

/// Session bearer tokens live for this many days.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Session JWT issuer claim.
pub const SESSION_ISSUER: &str = "calendar-app";

/// Session JWT audience claim.
pub const SESSION_AUDIENCE: &str = "calendar-users";

/// Upper bound on `maxResults` per upstream events page.
pub const SYNC_MAX_RESULTS: u32 = 2500;

/// Page cap used for webhook-triggered incremental syncs.
pub const WEBHOOK_SYNC_MAX_RESULTS: u32 = 100;

/// A `sync_in_progress` row older than this is considered abandoned.
pub const SYNC_STALE_AFTER_SECS: i64 = 3600;

/// Users at or beyond this many consecutive sync failures are skipped
/// by the background scheduler.
pub const MAX_CONSECUTIVE_SYNC_ERRORS: u32 = 5;

/// Default page size for event listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Maximum page size for event listings.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Per-attempt deadline for upstream HTTP calls, in seconds.
pub const UPSTREAM_CALL_TIMEOUT_SECS: u64 = 10;
