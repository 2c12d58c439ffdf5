//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Calbridge
///
/// Variants correspond to the caller-visible error taxonomy; HTTP status
/// mapping happens at the API boundary.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalbridgeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream rate limit: {0}")]
    RateLimited(String),

    #[error("Upstream quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalbridgeError {
    /// Stable machine-readable kind for logs and per-item sync errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not-found",
            Self::RateLimited(_) => "upstream-rate-limited",
            Self::QuotaExceeded(_) => "upstream-quota-exceeded",
            Self::UpstreamAuth(_) => "upstream-auth",
            Self::Network(_) => "upstream-network",
            Self::Conflict(_) => "conflict",
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Security(_) => "security",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for Calbridge operations
pub type Result<T> = std::result::Result<T, CalbridgeError>;
