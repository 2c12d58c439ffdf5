//! Upstream error classification.

use std::time::Duration;

use thiserror::Error;

use calbridge_domain::CalbridgeError;

/// Classified failure from an upstream call.
///
/// Classification drives the retry decision: only `RateLimited` and
/// `Network` are retryable. `Gone` and `NotFound` carry semantics their
/// callers act on (sync-token invalidation, delete-already-gone).
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("rate limited: {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("resource gone: {0}")]
    Gone(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Other(String),
}

impl UpstreamError {
    /// Classify an HTTP response by status and error body.
    ///
    /// The body predicates follow the upstream convention of naming the
    /// violated limit in `error.errors[].reason`.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: &str) -> Self {
        match status {
            429 => Self::RateLimited { message: truncate(body), retry_after },
            403 => {
                if body.contains("dailyLimitExceeded") {
                    Self::QuotaExceeded(truncate(body))
                } else if body.contains("rateLimitExceeded")
                    || body.contains("userRateLimitExceeded")
                {
                    Self::RateLimited { message: truncate(body), retry_after }
                } else {
                    Self::Other(format!("HTTP 403: {}", truncate(body)))
                }
            }
            401 => Self::AuthFailed(truncate(body)),
            410 => Self::Gone(truncate(body)),
            404 => Self::NotFound(truncate(body)),
            500..=599 => Self::Network(format!("HTTP {status}: {}", truncate(body))),
            _ => {
                if body.contains("invalid_grant") || body.contains("unauthorized") {
                    Self::AuthFailed(truncate(body))
                } else {
                    Self::Other(format!("HTTP {status}: {}", truncate(body)))
                }
            }
        }
    }

    /// Classify a transport-level failure.
    pub fn from_transport(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Whether the retry executor may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }

    /// Server-requested delay, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short class label for metrics and logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate-limited",
            Self::QuotaExceeded(_) => "quota-exceeded",
            Self::AuthFailed(_) => "auth-failed",
            Self::Network(_) => "network",
            Self::Gone(_) => "gone",
            Self::NotFound(_) => "not-found",
            Self::Other(_) => "other",
        }
    }
}

impl From<UpstreamError> for CalbridgeError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::RateLimited { message, .. } => CalbridgeError::RateLimited(message),
            UpstreamError::QuotaExceeded(msg) => CalbridgeError::QuotaExceeded(msg),
            UpstreamError::AuthFailed(msg) => CalbridgeError::UpstreamAuth(msg),
            UpstreamError::Network(msg) => CalbridgeError::Network(msg),
            UpstreamError::Gone(msg) => CalbridgeError::NotFound(msg),
            UpstreamError::NotFound(msg) => CalbridgeError::NotFound(msg),
            UpstreamError::Other(msg) => CalbridgeError::Internal(msg),
        }
    }
}

/// Error bodies can be large HTML pages; keep log payloads bounded.
fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_rate_limited() {
        let err = UpstreamError::from_status(429, Some(Duration::from_secs(7)), "slow down");
        assert_eq!(err.class(), "rate-limited");
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn classifies_403_by_body_predicate() {
        let quota = UpstreamError::from_status(403, None, r#"{"reason":"dailyLimitExceeded"}"#);
        assert_eq!(quota.class(), "quota-exceeded");
        assert!(!quota.is_retryable());

        let rate = UpstreamError::from_status(403, None, r#"{"reason":"userRateLimitExceeded"}"#);
        assert_eq!(rate.class(), "rate-limited");
        assert!(rate.is_retryable());

        let other = UpstreamError::from_status(403, None, "forbidden");
        assert_eq!(other.class(), "other");
    }

    #[test]
    fn classifies_auth_gone_and_server_errors() {
        assert_eq!(UpstreamError::from_status(401, None, "expired").class(), "auth-failed");
        assert_eq!(UpstreamError::from_status(410, None, "sync token").class(), "gone");
        assert_eq!(UpstreamError::from_status(503, None, "try later").class(), "network");
        assert!(UpstreamError::from_status(503, None, "x").is_retryable());
        assert!(!UpstreamError::from_status(401, None, "x").is_retryable());
    }

    #[test]
    fn invalid_grant_body_maps_to_auth() {
        let err = UpstreamError::from_status(400, None, r#"{"error":"invalid_grant"}"#);
        assert_eq!(err.class(), "auth-failed");
    }

    #[test]
    fn maps_into_domain_errors() {
        let err: CalbridgeError = UpstreamError::QuotaExceeded("daily".into()).into();
        assert!(matches!(err, CalbridgeError::QuotaExceeded(_)));
    }

    #[test]
    fn truncates_oversized_bodies() {
        let body = "x".repeat(4096);
        let err = UpstreamError::from_status(500, None, &body);
        assert!(err.to_string().len() < 1024);
    }
}
