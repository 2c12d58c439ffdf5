//! Authentication flow handlers.

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use calbridge_domain::constants::OAUTH_STATE_TTL_SECS;
use calbridge_domain::CalbridgeError;

use crate::envelope::{ok, ok_with_message, ApiError, ApiResult};
use crate::session::{
    bearer_token, clear_oauth_state_cookie, clear_session_cookie, cookie_value,
    oauth_state_cookie, session_cookie, OAUTH_STATE_COOKIE,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /auth/google: issue CSRF state and redirect to the consent page.
pub async fn initiate(State(state): State<AppState>) -> ApiResult {
    let initiation = state.orchestrator.initiate(None).await?;
    let secure = state.config.environment.is_production();

    let mut response = Redirect::temporary(&initiation.authorization_url).into_response();
    append_cookie(
        &mut response,
        &oauth_state_cookie(&initiation.state, OAUTH_STATE_TTL_SECS, secure),
    )?;
    Ok(response)
}

/// GET /auth/google/callback: consume the code, set the session cookie,
/// and bounce back to the client.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> ApiResult {
    if let Some(error) = query.error {
        return Err(ApiError(CalbridgeError::Unauthenticated(format!(
            "authorization denied upstream: {error}"
        ))));
    }

    let code = query
        .code
        .ok_or_else(|| CalbridgeError::Validation("missing authorization code".to_string()))?;
    let callback_state = query
        .state
        .ok_or_else(|| CalbridgeError::Validation("missing oauth state".to_string()))?;

    let session_state = cookie_value(&headers, OAUTH_STATE_COOKIE);
    let completion = state
        .orchestrator
        .complete(&code, &callback_state, session_state.as_deref())
        .await?;

    info!(user_id = %completion.user.id, "session established");

    let secure = state.config.environment.is_production();
    let max_age = state.sessions.lifetime().num_seconds();

    let mut response =
        Redirect::temporary(&state.config.server.frontend_url).into_response();
    append_cookie(&mut response, &session_cookie(&completion.session_token, max_age, secure))?;
    append_cookie(&mut response, &clear_oauth_state_cookie(secure))?;
    Ok(response)
}

/// POST /auth/refresh: force a token refresh and rotate the session.
pub async fn refresh(
    State(state): State<AppState>,
    user: crate::session::CurrentUser,
) -> ApiResult {
    let session_token = state.orchestrator.refresh_session(&user.user_id).await?;

    let secure = state.config.environment.is_production();
    let max_age = state.sessions.lifetime().num_seconds();

    let mut response = ok_with_message(json!({}), "tokens refreshed");
    append_cookie(&mut response, &session_cookie(&session_token, max_age, secure))?;
    Ok(response)
}

/// POST /auth/logout: revoke upstream tokens and clear the cookie.
pub async fn logout(
    State(state): State<AppState>,
    user: crate::session::CurrentUser,
) -> ApiResult {
    state.orchestrator.logout(&user.user_id).await?;

    let secure = state.config.environment.is_production();
    let mut response = ok_with_message(json!({}), "logged out");
    append_cookie(&mut response, &clear_session_cookie(secure))?;
    Ok(response)
}

/// GET /auth/me: current user profile.
pub async fn me(State(state): State<AppState>, user: crate::session::CurrentUser) -> ApiResult {
    let profile = state.orchestrator.current_user(&user.user_id).await?;
    Ok(ok(profile))
}

/// GET /auth/status: non-failing authentication probe.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = bearer_token(&headers)
        .and_then(|token| state.sessions.verify(&token).ok());

    match user {
        Some(claims) => ok(json!({
            "authenticated": true,
            "user": { "id": claims.sub, "email": claims.email },
        })),
        None => ok(json!({ "authenticated": false })),
    }
}

fn append_cookie(response: &mut Response, cookie: &str) -> Result<(), ApiError> {
    let value = cookie.parse().map_err(|_| {
        ApiError(CalbridgeError::Internal("could not encode cookie header".to_string()))
    })?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(())
}
