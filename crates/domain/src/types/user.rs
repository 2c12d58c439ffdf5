//! User entity and profile types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A principal with an upstream Google account linkage.
///
/// Token columns hold vault-wrapped ciphertext; the plaintext never leaves
/// the token manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub google_id: Option<String>,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub access_token_enc: Option<String>,
    #[serde(skip_serializing, default)]
    pub refresh_token_enc: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Public profile projection (no credential material).
    pub fn profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            picture_url: self.picture_url.clone(),
        }
    }
}

/// Profile fields returned by the upstream userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamProfile {
    pub google_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

/// Credential-free user view exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

/// A short-lived CSRF nonce for the authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub state: String,
    pub user_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
