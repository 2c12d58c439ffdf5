//! Google OAuth2 control-plane client.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use calbridge_common::UpstreamError;
use calbridge_core::ports::{OAuthApi, TokenGrant};
use calbridge_domain::constants::UPSTREAM_CALL_TIMEOUT_SECS;
use calbridge_domain::{GoogleConfig, UpstreamProfile};

use super::types::{GoogleTokenResponse, GoogleUserinfo};

const DEFAULT_AUTH_BASE: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_BASE: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REVOKE_BASE: &str = "https://oauth2.googleapis.com/revoke";
const DEFAULT_USERINFO_BASE: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const SCOPES: &str = "openid email profile \
    https://www.googleapis.com/auth/calendar \
    https://www.googleapis.com/auth/calendar.events";

pub struct GoogleOAuthClient {
    http: Client,
    config: GoogleConfig,
    auth_base: String,
    token_base: String,
    revoke_base: String,
    userinfo_base: String,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_CALL_TIMEOUT_SECS))
            .build()
            .map_err(|e| UpstreamError::Other(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            config,
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            token_base: DEFAULT_TOKEN_BASE.to_string(),
            revoke_base: DEFAULT_REVOKE_BASE.to_string(),
            userinfo_base: DEFAULT_USERINFO_BASE.to_string(),
        })
    }

    /// Redirect every endpoint to a single base URL (tests).
    pub fn with_endpoint_base(mut self, base: &str) -> Self {
        self.auth_base = format!("{base}/auth");
        self.token_base = format!("{base}/token");
        self.revoke_base = format!("{base}/revoke");
        self.userinfo_base = format!("{base}/userinfo");
        self
    }
}

#[async_trait]
impl OAuthApi for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        // Endpoint constants are valid URLs; parsing cannot fail at runtime.
        let mut url = Url::parse(&self.auth_base).unwrap_or_else(|_| {
            Url::parse(DEFAULT_AUTH_BASE).expect("default auth endpoint is a valid URL")
        });

        let scopes = SCOPES.split_whitespace().collect::<Vec<_>>().join(" ");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes)
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        url.to_string()
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, UpstreamError> {
        let response = self
            .http
            .post(&self.token_base)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(e.to_string()))?;

        parse_grant(response).await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, UpstreamError> {
        let response = self
            .http
            .post(&self.token_base)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(e.to_string()))?;

        parse_grant(response).await
    }

    #[instrument(skip(self, token))]
    async fn revoke_token(&self, token: &str) -> Result<(), UpstreamError> {
        let response = self
            .http
            .post(&self.revoke_base)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::from_status(status, None, &body))
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_profile(&self, access_token: &str) -> Result<UpstreamProfile, UpstreamError> {
        let response = self
            .http
            .get(&self.userinfo_base)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, None, &body));
        }

        let userinfo: GoogleUserinfo = response
            .json()
            .await
            .map_err(|e| UpstreamError::Other(format!("userinfo parse failed: {e}")))?;

        Ok(UpstreamProfile {
            google_id: userinfo.id,
            email: userinfo.email,
            display_name: userinfo.name,
            picture_url: userinfo.picture,
        })
    }
}

async fn parse_grant(response: reqwest::Response) -> Result<TokenGrant, UpstreamError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::from_status(status, None, &body));
    }

    let body: GoogleTokenResponse = response
        .json()
        .await
        .map_err(|e| UpstreamError::Other(format!("token response parse failed: {e}")))?;

    Ok(TokenGrant {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_in: body.expires_in,
    })
}
