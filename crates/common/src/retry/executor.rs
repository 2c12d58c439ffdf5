//! Retry loop with exponential backoff and deadline awareness.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use super::error::UpstreamError;
use super::metrics::UpstreamMetrics;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_JITTER_FACTOR: f64 = 0.25;
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Backoff parameters for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    /// Total budget for the operation; the loop aborts rather than
    /// sleeping past it.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Policy for interactive upstream calls: short budget, few attempts.
    pub fn upstream() -> Self {
        Self { max_attempts: 3, deadline: Some(Duration::from_secs(60)), ..Self::default() }
    }

    /// Policy for background sync work: more attempts, longer budget.
    pub fn background() -> Self {
        Self {
            max_attempts: 5,
            max_delay: Duration::from_secs(60),
            deadline: Some(Duration::from_secs(300)),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// delay = min(max_delay, base × multiplier^attempt), jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let raw_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(capped_ms as u64);
        }

        let jitter_range = capped_ms * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_range / 2.0..=jitter_range / 2.0);
        Duration::from_millis((capped_ms + jitter).max(0.0) as u64)
    }
}

/// Executes upstream operations under a retry policy, accounting every
/// call into the shared process metrics.
#[derive(Clone)]
pub struct RetryExecutor {
    metrics: Arc<UpstreamMetrics>,
}

impl RetryExecutor {
    pub fn new(metrics: Arc<UpstreamMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<UpstreamMetrics> {
        &self.metrics
    }

    /// Run `op` until it succeeds, fails non-retryably, exhausts the
    /// attempt budget, or would overrun the policy deadline.
    ///
    /// Rate-limited failures honor the server's `Retry-After` when it is
    /// present; otherwise the exponential schedule applies.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut op: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let started = Instant::now();
        let deadline = policy.deadline.map(|budget| started + budget);
        let attempts = policy.max_attempts.max(1);
        let mut last_error: Option<UpstreamError> = None;

        for attempt in 0..attempts {
            let call_start = Instant::now();
            match op().await {
                Ok(value) => {
                    self.metrics.record_success(call_start.elapsed());
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "upstream call recovered");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    self.metrics.record_error(&err, call_start.elapsed());

                    if !err.is_retryable() {
                        debug!(operation, class = err.class(), "non-retryable upstream error");
                        return Err(err);
                    }

                    if attempt + 1 >= attempts {
                        last_error = Some(err);
                        break;
                    }

                    let delay = err.retry_after().unwrap_or_else(|| policy.delay_for(attempt));

                    if let Some(deadline) = deadline {
                        if Instant::now() + delay > deadline {
                            warn!(
                                operation,
                                attempt = attempt + 1,
                                "next retry would exceed deadline, surfacing last error"
                            );
                            return Err(err);
                        }
                    }

                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "upstream call failed, backing off"
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| UpstreamError::Other("retry attempts exhausted".to_string())))
    }
}
