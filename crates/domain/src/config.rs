//! Typed application configuration
//!
//! Values are populated by the environment loader in `calbridge-infra`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Deployment environment, controls cookie security and error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Top-level configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Externally reachable base URL of this service, used for webhook
    /// callback registration.
    pub public_url: String,
    /// Client application base URL, used for post-auth redirects.
    pub frontend_url: String,
    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Absolute redirect URI registered with the upstream console.
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for session bearer tokens.
    pub jwt_secret: String,
    /// Session token lifetime in hours.
    pub jwt_lifetime_hours: i64,
    /// Deployment secret the vault key is derived from.
    pub session_secret: String,
}

/// Inbound rate-limit parameters (consumed by middleware outside this core).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}
