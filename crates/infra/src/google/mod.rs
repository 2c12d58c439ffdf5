//! Google API adapters: calendar data plane and OAuth2 control plane.

mod client;
mod mapping;
mod oauth;
mod types;

pub use client::GoogleCalendarClient;
pub use oauth::GoogleOAuthClient;
