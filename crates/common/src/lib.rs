//! # Calbridge Common
//!
//! Foundation utilities shared by every layer:
//!
//! - [`crypto`]: at-rest wrapping of credentials (AES-256-GCM)
//! - [`retry`]: classified retry executor with backoff and process metrics
//! - [`validation`]: input validation helpers
//!
//! ## Architecture
//! - Depends only on `calbridge-domain`
//! - No I/O beyond retry sleeps; no database or HTTP code

pub mod crypto;
pub mod retry;
pub mod validation;

pub use crypto::TokenVault;
pub use retry::{RetryExecutor, RetryPolicy, UpstreamError, UpstreamMetrics};
