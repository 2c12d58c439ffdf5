//! Environment configuration loader
//!
//! Loads the application configuration from environment variables.
//!
//! ## Environment Variables
//! - `CALBRIDGE_PORT`: HTTP listen port (default 3000)
//! - `CALBRIDGE_DB_PATH`: Database file path (required)
//! - `CALBRIDGE_DB_POOL_SIZE`: Connection pool size (default 10)
//! - `CALBRIDGE_DB_TIMEOUT_SECS`: Pool acquisition timeout (default 30)
//! - `CALBRIDGE_JWT_SECRET`: Session token signing secret (required)
//! - `CALBRIDGE_JWT_LIFETIME_HOURS`: Session lifetime (default 168 = 7 days)
//! - `CALBRIDGE_SESSION_SECRET`: Deployment secret for the credential vault (required)
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`: Upstream OAuth client (required)
//! - `GOOGLE_REDIRECT_URI`: Registered callback URL (required)
//! - `CALBRIDGE_PUBLIC_URL`: Externally reachable base URL of this service
//! - `CALBRIDGE_FRONTEND_URL`: Client app base URL (default http://localhost:5173)
//! - `CALBRIDGE_CORS_ORIGINS`: Comma-separated allowed origins
//! - `CALBRIDGE_RATE_LIMIT_WINDOW_SECS` / `CALBRIDGE_RATE_LIMIT_MAX`: Inbound limits
//! - `CALBRIDGE_ENV`: `development` (default) or `production`
//! - `CALBRIDGE_LOG_LEVEL`: tracing filter (default `info`)

use std::path::PathBuf;

use calbridge_domain::{
    AppConfig, AuthConfig, CalbridgeError, DatabaseConfig, Environment, GoogleConfig,
    RateLimitConfig, Result, ServerConfig,
};

/// Load configuration from environment variables.
///
/// # Errors
/// Returns `CalbridgeError::Config` when a required variable is missing
/// or a value fails to parse.
pub fn load_from_env() -> Result<AppConfig> {
    let environment = match optional_var("CALBRIDGE_ENV").as_deref() {
        Some("production") => Environment::Production,
        Some("development") | None => Environment::Development,
        Some(other) => {
            return Err(CalbridgeError::Config(format!("unknown CALBRIDGE_ENV: {other}")))
        }
    };

    let port = parse_var("CALBRIDGE_PORT", 3000u16)?;
    let public_url = optional_var("CALBRIDGE_PUBLIC_URL")
        .unwrap_or_else(|| format!("http://localhost:{port}"));
    let frontend_url = optional_var("CALBRIDGE_FRONTEND_URL")
        .unwrap_or_else(|| "http://localhost:5173".to_string());
    let cors_origins = optional_var("CALBRIDGE_CORS_ORIGINS")
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_else(|| vec![frontend_url.clone()]);

    Ok(AppConfig {
        environment,
        server: ServerConfig { port, public_url, frontend_url, cors_origins },
        database: DatabaseConfig {
            path: PathBuf::from(required_var("CALBRIDGE_DB_PATH")?),
            pool_size: parse_var("CALBRIDGE_DB_POOL_SIZE", 10u32)?,
            connection_timeout_secs: parse_var("CALBRIDGE_DB_TIMEOUT_SECS", 30u64)?,
        },
        google: GoogleConfig {
            client_id: required_var("GOOGLE_CLIENT_ID")?,
            client_secret: required_var("GOOGLE_CLIENT_SECRET")?,
            redirect_uri: required_var("GOOGLE_REDIRECT_URI")?,
        },
        auth: AuthConfig {
            jwt_secret: required_var("CALBRIDGE_JWT_SECRET")?,
            jwt_lifetime_hours: parse_var("CALBRIDGE_JWT_LIFETIME_HOURS", 168i64)?,
            session_secret: required_var("CALBRIDGE_SESSION_SECRET")?,
        },
        rate_limit: RateLimitConfig {
            window_secs: parse_var("CALBRIDGE_RATE_LIMIT_WINDOW_SECS", 60u64)?,
            max_requests: parse_var("CALBRIDGE_RATE_LIMIT_MAX", 120u32)?,
        },
        log_level: optional_var("CALBRIDGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
    })
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| CalbridgeError::Config(format!("missing environment variable: {name}")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| CalbridgeError::Config(format!("invalid value for {name}: {e}"))),
        None => Ok(default),
    }
}
