//! Classified retry with exponential backoff.
//!
//! Every outbound upstream call goes through [`RetryExecutor::execute`].
//! Errors arrive as [`UpstreamError`] values; the executor retries only
//! the transient classes (rate-limited, network), honors `Retry-After`,
//! and aborts rather than sleeping past the caller's deadline.

mod error;
mod executor;
mod metrics;

pub use error::UpstreamError;
pub use executor::{RetryExecutor, RetryPolicy};
pub use metrics::{MetricsSnapshot, UpstreamMetrics};
