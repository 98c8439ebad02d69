//! Session endpoints for cookie and bearer auth.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::{
    state::AuthConfig,
    types::{SessionInfo, SessionResponse},
    utils::{extract_client_ip, extract_user_agent, generate_token, hash_token},
};
use crate::{
    api::error::{ApiError, ResultExt},
    store::{DynStore, NewSession, SessionRecord},
};

pub const SESSION_COOKIE_NAME: &str = "gatehouse_session";

#[utoipa::path(
    get,
    path = "/api/auth/get-session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session"),
        (status = 500, description = "Session lookup failed", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn get_session(
    headers: HeaderMap,
    store: Extension<DynStore>,
) -> Result<axum::response::Response, ApiError> {
    let Some(record) = authenticate_session(&headers, &store)
        .await
        .or_unexpected("Failed to get session")?
    else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let Some(user) = store
        .user_by_id(record.user_id)
        .await
        .or_unexpected("Failed to get session")?
    else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let response = SessionResponse {
        user,
        session: SessionInfo {
            expires_at: record.expires_at,
        },
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn sign_out(
    headers: HeaderMap,
    store: Extension<DynStore>,
    auth_config: Extension<Arc<AuthConfig>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = store.delete_session(&hash_token(&token)).await {
            error!("Failed to delete session: {err:#}");
        }
    }

    // Cleared even when the session row was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&auth_config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Resolve the cookie or bearer token into a live session.
///
/// Returns `Ok(None)` when no token is presented or it is unknown or expired.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    store: &DynStore,
) -> anyhow::Result<Option<SessionRecord>> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    store.lookup_session(&hash_token(&token)).await
}

/// Persist a new session for `user_id` and return the `Set-Cookie` value.
pub(super) async fn open_session(
    store: &DynStore,
    auth_config: &AuthConfig,
    headers: &HeaderMap,
    user_id: Uuid,
) -> anyhow::Result<HeaderValue> {
    let token = generate_token()?;
    let session = NewSession {
        token_hash: hash_token(&token),
        user_id,
        expires_at: Utc::now() + Duration::seconds(auth_config.session_ttl_seconds()),
        ip_address: extract_client_ip(headers),
        user_agent: extract_user_agent(headers),
    };
    store.create_session(session).await?;
    Ok(session_cookie(auth_config, &token)?)
}

pub(super) fn session_cookie(
    auth_config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if auth_config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if auth_config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer header wins over the cookie.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
