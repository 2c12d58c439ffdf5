//! OAuth token lifecycle with automatic refresh
//!
//! Manages per-user credentials:
//! - Vault-wrapped persistence through the user store
//! - Validity guarantee with a refresh buffer (default 5 min)
//! - Per-user single-flight refresh
//! - Best-effort upstream revocation

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use calbridge_common::{RetryExecutor, RetryPolicy, TokenVault};
use calbridge_domain::constants::TOKEN_REFRESH_BUFFER_SECS;
use calbridge_domain::{CalbridgeError, Result};

use crate::ports::{OAuthApi, StoredCredentials, TokenGrant, UserStore};

/// Plaintext credential view; never persisted or logged.
#[derive(Clone)]
pub struct TokenCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
}

impl std::fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl TokenCredentials {
    /// Whether the access token is still usable past the buffer at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now + Duration::seconds(TOKEN_REFRESH_BUFFER_SECS)
    }
}

/// Owns the per-user OAuth2 credential lifecycle.
pub struct TokenManager {
    users: Arc<dyn UserStore>,
    oauth: Arc<dyn OAuthApi>,
    vault: Arc<TokenVault>,
    retry: RetryExecutor,
    /// One lock per user id; duplicate concurrent refreshes collapse onto
    /// the holder's result via the post-lock re-read.
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        oauth: Arc<dyn OAuthApi>,
        vault: Arc<TokenVault>,
        retry: RetryExecutor,
    ) -> Self {
        Self { users, oauth, vault, retry, flights: Mutex::new(HashMap::new()) }
    }

    /// Wrap and persist a credential set.
    #[instrument(skip(self, credentials))]
    pub async fn store(&self, user_id: &str, credentials: &TokenCredentials) -> Result<()> {
        let stored = StoredCredentials {
            access_token_enc: self.vault.wrap(&credentials.access_token)?,
            refresh_token_enc: credentials
                .refresh_token
                .as_deref()
                .map(|token| self.vault.wrap(token))
                .transpose()?,
            expiry: credentials.expiry,
        };

        self.users.store_credentials(user_id, &stored).await?;
        debug!(user_id, "stored wrapped credentials");
        Ok(())
    }

    /// Load and unwrap stored credentials; `None` when the user has no
    /// access token.
    pub async fn load(&self, user_id: &str) -> Result<Option<TokenCredentials>> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            return Ok(None);
        };

        let Some(access_enc) = user.access_token_enc else {
            return Ok(None);
        };

        let access_token = self.vault.unwrap(&access_enc)?;
        let refresh_token =
            user.refresh_token_enc.as_deref().map(|enc| self.vault.unwrap(enc)).transpose()?;

        Ok(Some(TokenCredentials {
            access_token,
            refresh_token,
            expiry: user.token_expiry.unwrap_or_else(Utc::now),
        }))
    }

    /// Refresh the access token using the stored refresh token.
    #[instrument(skip(self))]
    pub async fn refresh(&self, user_id: &str) -> Result<TokenCredentials> {
        let flight = self.flight_lock(user_id).await;
        let _guard = flight.lock().await;
        self.refresh_locked(user_id).await
    }

    /// The canonical pre-flight for outbound upstream calls: returns an
    /// access token valid for at least the refresh buffer, refreshing
    /// when necessary.
    #[instrument(skip(self))]
    pub async fn ensure_valid(&self, user_id: &str) -> Result<String> {
        let credentials = self
            .load(user_id)
            .await?
            .ok_or_else(|| CalbridgeError::Unauthenticated("no stored credentials".to_string()))?;

        if credentials.is_valid_at(Utc::now()) {
            return Ok(credentials.access_token);
        }

        let flight = self.flight_lock(user_id).await;
        let _guard = flight.lock().await;

        // A concurrent flight may have refreshed while we waited; a newer
        // persisted token wins over starting another refresh.
        if let Some(current) = self.load(user_id).await? {
            if current.is_valid_at(Utc::now()) {
                debug!(user_id, "token refreshed by concurrent flight");
                return Ok(current.access_token);
            }
        }

        let refreshed = self.refresh_locked(user_id).await?;
        Ok(refreshed.access_token)
    }

    /// Best-effort upstream revocation followed by an unconditional local
    /// credential clear.
    #[instrument(skip(self))]
    pub async fn revoke(&self, user_id: &str) -> Result<()> {
        if let Some(credentials) = self.load(user_id).await? {
            // Revoking the refresh token invalidates the whole grant;
            // fall back to the access token when none is stored.
            let target =
                credentials.refresh_token.as_deref().unwrap_or(&credentials.access_token);
            if let Err(err) = self.oauth.revoke_token(target).await {
                warn!(user_id, error = %err, "upstream token revocation failed");
            }
        }

        self.users.clear_credentials(user_id).await?;
        info!(user_id, "credentials cleared");
        Ok(())
    }

    async fn refresh_locked(&self, user_id: &str) -> Result<TokenCredentials> {
        let credentials = self
            .load(user_id)
            .await?
            .ok_or_else(|| CalbridgeError::Unauthenticated("no stored credentials".to_string()))?;

        let refresh_token = credentials.refresh_token.clone().ok_or_else(|| {
            CalbridgeError::Unauthenticated("no refresh token available".to_string())
        })?;

        let grant: TokenGrant = self
            .retry
            .execute("oauth.refresh", &RetryPolicy::upstream(), || {
                self.oauth.refresh_access_token(&refresh_token)
            })
            .await?;

        let refreshed = TokenCredentials {
            access_token: grant.access_token,
            // The upstream reissues refresh tokens only on consent; keep
            // the stored one otherwise.
            refresh_token: grant.refresh_token.or(Some(refresh_token)),
            expiry: Utc::now() + Duration::seconds(grant.expires_in),
        };

        self.store(user_id, &refreshed).await?;
        info!(user_id, "access token refreshed");
        Ok(refreshed)
    }

    async fn flight_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
