//! # Calbridge Core
//!
//! Business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for stores and upstream APIs
//! - Token lifecycle management with single-flight refresh
//! - OAuth authorization-code orchestration and session tokens
//! - The sync engine (full + incremental with cursor fallback)
//! - The write-through event mediator
//! - Webhook demultiplexing and subscription lifecycle
//!
//! ## Architecture Principles
//! - Only depends on `calbridge-domain` and `calbridge-common`
//! - No database or HTTP code; all external effects via traits
//! - Pure, testable business logic

pub mod auth;
pub mod events;
pub mod ports;
pub mod session;
pub mod sync;
pub mod token;
pub mod webhook;

pub use auth::{AuthCompletion, AuthInitiation, OAuthOrchestrator};
pub use events::EventService;
pub use session::{SessionClaims, SessionSigner};
pub use sync::SyncEngine;
pub use token::{TokenCredentials, TokenManager};
pub use webhook::WebhookService;
