//! Password reset: token issue, email link and completion.
//!
//! The same path serves invited users. Approval creates a credential account
//! without a password and then issues a reset token in invite mode, so the
//! first password is set through the reset link.

use anyhow::{Context, Result};
use axum::{extract::rejection::JsonRejection, extract::Extension, http::StatusCode, Json};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    state::AuthConfig,
    types::{PasswordResetRequest, ResetPasswordRequest, StatusResponse},
    utils::{generate_token, hash_password, hash_token, validate_password},
};
use crate::{
    api::{
        email::{
            templates::{self, PasswordLinkKind},
            EmailDispatcher,
        },
        error::{ApiError, ResultExt},
        handlers::validation::normalize,
    },
    store::DynStore,
};

const RESET_IDENTIFIER_PREFIX: &str = "reset-password:";
const INVALID_TOKEN: &str = "Invalid or expired token";
const RESET_REQUESTED: &str = "If this email exists in our system, check your email for the reset link";

/// Issue a reset token for `email` and queue the link.
///
/// Returns `Ok(false)` when no user has that email. Email delivery is not
/// awaited; only token storage can fail.
pub(crate) async fn initiate_password_reset(
    store: &DynStore,
    dispatcher: &EmailDispatcher,
    auth_config: &AuthConfig,
    email: &str,
    kind: PasswordLinkKind,
) -> Result<bool> {
    let Some(user) = store.user_by_email(email).await? else {
        return Ok(false);
    };

    let token = generate_token()?;
    let ttl_seconds = auth_config.password_reset_ttl_seconds();
    let expires_at = Utc::now() + Duration::seconds(ttl_seconds);
    store
        .insert_verification(
            &format!("{RESET_IDENTIFIER_PREFIX}{}", user.id),
            &hash_token(&token),
            expires_at,
        )
        .await
        .context("failed to store password reset token")?;

    let url = auth_config.password_reset_url(&token);
    let message = templates::password_link(
        &user.email,
        user.display_username.as_deref().unwrap_or(&user.username),
        &url,
        ttl_seconds / 60,
        kind,
    );
    if dispatcher.enqueue(message) {
        info!(user_id = %user.id, ?kind, "password link queued");
    }
    Ok(true)
}

#[utoipa::path(
    post,
    path = "/api/auth/request-password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset requested; the response does not reveal whether the email exists", body = StatusResponse),
        (status = 400, description = "Invalid request body", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    store: Extension<DynStore>,
    dispatcher: Extension<EmailDispatcher>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::validation("Invalid request body"))?;
    let email = normalize(&request.email);

    if !email.is_empty() {
        // Failures are logged only; the response is the same either way.
        match initiate_password_reset(
            &store,
            &dispatcher,
            &auth_config,
            &email,
            PasswordLinkKind::Reset,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => info!("password reset requested for unknown email"),
            Err(err) => warn!("Failed to initiate password reset: {err:#}"),
        }
    }

    Ok((
        StatusCode::OK,
        Json(StatusResponse {
            status: true,
            message: Some(RESET_REQUESTED.to_string()),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated and sessions revoked", body = StatusResponse),
        (status = 400, description = "Invalid or expired token, or bad password", body = crate::api::error::ErrorBody),
        (status = 500, description = "Internal error", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    store: Extension<DynStore>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::validation("Invalid request body"))?;
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::validation(INVALID_TOKEN));
    }
    // Checked before the token is consumed so a bad password does not burn it.
    validate_password(&request.new_password).map_err(ApiError::Validation)?;

    let identifier = store
        .consume_verification(&hash_token(token))
        .await
        .or_unexpected("Failed to reset password")?
        .ok_or_else(|| ApiError::validation(INVALID_TOKEN))?;
    let user_id = identifier
        .strip_prefix(RESET_IDENTIFIER_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| ApiError::validation(INVALID_TOKEN))?;
    if store
        .user_by_id(user_id)
        .await
        .or_unexpected("Failed to reset password")?
        .is_none()
    {
        return Err(ApiError::validation(INVALID_TOKEN));
    }

    let password_hash = hash_password(&request.new_password)
        .await
        .or_unexpected("Failed to reset password")?;
    store
        .set_password(user_id, &password_hash)
        .await
        .or_unexpected("Failed to reset password")?;
    let revoked = store
        .delete_user_sessions(user_id)
        .await
        .or_unexpected("Failed to reset password")?;
    info!(%user_id, revoked, "password reset completed");

    Ok((
        StatusCode::OK,
        Json(StatusResponse {
            status: true,
            message: None,
        }),
    ))
}
