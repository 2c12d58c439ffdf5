//! Process-wide upstream call accounting.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::error::UpstreamError;

/// Atomic counters shared by every retry executor in the process.
///
/// The rolling average response time is approximate: it divides the
/// accumulated milliseconds by the call count without windowing.
#[derive(Debug, Default)]
pub struct UpstreamMetrics {
    total_calls: AtomicU64,
    rate_limit_hits: AtomicU64,
    quota_hits: AtomicU64,
    network_errors: AtomicU64,
    auth_errors: AtomicU64,
    total_response_ms: AtomicU64,
    last_call_unix_ms: AtomicI64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub rate_limit_hits: u64,
    pub quota_hits: u64,
    pub network_errors: u64,
    pub auth_errors: u64,
    pub avg_response_ms: u64,
    pub last_call_unix_ms: Option<i64>,
}

impl UpstreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.record_call(elapsed);
    }

    pub fn record_error(&self, error: &UpstreamError, elapsed: Duration) {
        self.record_call(elapsed);
        match error {
            UpstreamError::RateLimited { .. } => {
                self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            }
            UpstreamError::QuotaExceeded(_) => {
                self.quota_hits.fetch_add(1, Ordering::Relaxed);
            }
            UpstreamError::Network(_) => {
                self.network_errors.fetch_add(1, Ordering::Relaxed);
            }
            UpstreamError::AuthFailed(_) => {
                self.auth_errors.fetch_add(1, Ordering::Relaxed);
            }
            UpstreamError::Gone(_) | UpstreamError::NotFound(_) | UpstreamError::Other(_) => {}
        }
    }

    fn record_call(&self, elapsed: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_response_ms.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.last_call_unix_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let total_ms = self.total_response_ms.load(Ordering::Relaxed);
        let last = self.last_call_unix_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_calls,
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            quota_hits: self.quota_hits.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            auth_errors: self.auth_errors.load(Ordering::Relaxed),
            avg_response_ms: if total_calls == 0 { 0 } else { total_ms / total_calls },
            last_call_unix_ms: if last == 0 { None } else { Some(last) },
        }
    }

    /// Explicit reset; counters never reset implicitly.
    pub fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.rate_limit_hits.store(0, Ordering::Relaxed);
        self.quota_hits.store(0, Ordering::Relaxed);
        self.network_errors.store(0, Ordering::Relaxed);
        self.auth_errors.store(0, Ordering::Relaxed);
        self.total_response_ms.store(0, Ordering::Relaxed);
        self.last_call_unix_ms.store(0, Ordering::Relaxed);
    }
}
