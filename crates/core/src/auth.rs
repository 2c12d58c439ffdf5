//! Authorization-code flow orchestration.
//!
//! Drives the flow end-to-end: CSRF state issuance and one-shot
//! validation, code exchange, profile ingestion, user upsert, and
//! session token issuance.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use calbridge_common::{RetryExecutor, RetryPolicy, UpstreamError};
use calbridge_domain::constants::OAUTH_STATE_TTL_SECS;
use calbridge_domain::{
    CalbridgeError, OAuthState, PublicProfile, Result, UpstreamProfile, User,
};

use crate::ports::{OAuthApi, OAuthStateStore, TokenGrant, UserStore};
use crate::session::SessionSigner;
use crate::token::{TokenCredentials, TokenManager};

/// Output of flow initiation: where to send the caller, and the state to
/// stash in their session.
#[derive(Debug, Clone)]
pub struct AuthInitiation {
    pub authorization_url: String,
    pub state: String,
}

/// Output of a completed callback.
#[derive(Debug, Clone)]
pub struct AuthCompletion {
    pub user: PublicProfile,
    pub session_token: String,
}

pub struct OAuthOrchestrator {
    users: Arc<dyn UserStore>,
    states: Arc<dyn OAuthStateStore>,
    oauth: Arc<dyn OAuthApi>,
    tokens: Arc<TokenManager>,
    sessions: Arc<SessionSigner>,
    retry: RetryExecutor,
}

impl OAuthOrchestrator {
    pub fn new(
        users: Arc<dyn UserStore>,
        states: Arc<dyn OAuthStateStore>,
        oauth: Arc<dyn OAuthApi>,
        tokens: Arc<TokenManager>,
        sessions: Arc<SessionSigner>,
        retry: RetryExecutor,
    ) -> Self {
        Self { users, states, oauth, tokens, sessions, retry }
    }

    /// Start the flow: persist a fresh CSRF state and build the consent
    /// URL.
    #[instrument(skip(self))]
    pub async fn initiate(&self, user_id: Option<&str>) -> Result<AuthInitiation> {
        let state = generate_state();

        self.states
            .insert(&OAuthState {
                state: state.clone(),
                user_id: user_id.map(str::to_string),
                expires_at: Utc::now() + Duration::seconds(OAUTH_STATE_TTL_SECS),
            })
            .await?;

        Ok(AuthInitiation { authorization_url: self.oauth.authorization_url(&state), state })
    }

    /// Consume the callback: validate state, exchange the code, ingest
    /// the profile, upsert the user, store tokens, and issue a session.
    ///
    /// `session_state` is the value stashed in the caller's session at
    /// initiation; a mismatch against the query-string state is rejected
    /// before any storage lookup.
    #[instrument(skip(self, code))]
    pub async fn complete(
        &self,
        code: &str,
        state: &str,
        session_state: Option<&str>,
    ) -> Result<AuthCompletion> {
        if let Some(expected) = session_state {
            if expected != state {
                return Err(CalbridgeError::Validation("state mismatch".to_string()));
            }
        }

        let stored = self
            .states
            .consume(state)
            .await?
            .ok_or_else(|| CalbridgeError::Validation("unknown oauth state".to_string()))?;

        if stored.is_expired(Utc::now()) {
            return Err(CalbridgeError::Validation("expired oauth state".to_string()));
        }

        let grant = self
            .retry
            .execute("oauth.exchange", &RetryPolicy::upstream(), || {
                self.oauth.exchange_code(code)
            })
            .await
            .map_err(exchange_error)?;

        let profile = self
            .retry
            .execute("oauth.userinfo", &RetryPolicy::upstream(), || {
                self.oauth.fetch_profile(&grant.access_token)
            })
            .await
            .map_err(exchange_error)?;

        let user = self.upsert_user(&profile).await?;
        self.tokens.store(&user.id, &credentials_from_grant(&grant)).await?;

        let session_token = self.sessions.issue(&user.id, &user.email)?;
        info!(user_id = %user.id, "authorization flow completed");

        Ok(AuthCompletion { user: user.profile(), session_token })
    }

    /// Force a token refresh and rotate the session token.
    pub async fn refresh_session(&self, user_id: &str) -> Result<String> {
        self.tokens.refresh(user_id).await?;
        let user = self.require_user(user_id).await?;
        self.sessions.issue(&user.id, &user.email)
    }

    /// Revoke upstream tokens and clear stored credentials.
    pub async fn logout(&self, user_id: &str) -> Result<()> {
        self.tokens.revoke(user_id).await
    }

    pub async fn current_user(&self, user_id: &str) -> Result<PublicProfile> {
        Ok(self.require_user(user_id).await?.profile())
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CalbridgeError::Unauthenticated("unknown user".to_string()))
    }

    async fn upsert_user(&self, profile: &UpstreamProfile) -> Result<User> {
        let existing = match self.users.find_by_google_id(&profile.google_id).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(&profile.email).await?,
        };

        match existing {
            Some(user) => {
                self.users.update_profile(&user.id, profile).await?;
                // Re-read so callers observe the refreshed profile fields.
                self.require_user(&user.id).await
            }
            None => {
                let now = Utc::now();
                let user = User {
                    id: Uuid::new_v4().to_string(),
                    google_id: Some(profile.google_id.clone()),
                    email: profile.email.clone(),
                    display_name: profile.display_name.clone(),
                    picture_url: profile.picture_url.clone(),
                    access_token_enc: None,
                    refresh_token_enc: None,
                    token_expiry: None,
                    created_at: now,
                    updated_at: now,
                };
                self.users.insert(&user).await?;
                info!(user_id = %user.id, "created user from authorization flow");
                Ok(user)
            }
        }
    }
}

/// 32 bytes of OS randomness, URL-safe encoded.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn credentials_from_grant(grant: &TokenGrant) -> TokenCredentials {
    TokenCredentials {
        access_token: grant.access_token.clone(),
        refresh_token: grant.refresh_token.clone(),
        expiry: Utc::now() + Duration::seconds(grant.expires_in),
    }
}

/// Upstream exchange failures surface as unauthorized; only transport
/// failures keep their network classification.
fn exchange_error(err: UpstreamError) -> CalbridgeError {
    match err {
        UpstreamError::Network(msg) => CalbridgeError::Network(msg),
        other => {
            warn!(error = %other, "authorization code exchange failed");
            CalbridgeError::Unauthenticated(other.to_string())
        }
    }
}
