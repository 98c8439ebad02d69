//! Password sign-in by email or by username.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::{
    session::open_session,
    state::AuthConfig,
    types::{SignInEmailRequest, SignInUsernameRequest, UserResponse},
    utils::verify_password,
};
use crate::{
    api::{
        error::{ApiError, ResultExt},
        handlers::validation::{is_blank, normalize, MISSING_FIELDS},
    },
    store::{Credential, DynStore},
};

const SIGNIN_FAILED: &str = "Failed to sign in";

#[utoipa::path(
    post,
    path = "/api/auth/sign-in/email",
    request_body = SignInEmailRequest,
    responses(
        (status = 200, description = "Signed in", body = UserResponse),
        (status = 400, description = "Missing fields", body = crate::api::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn sign_in_email(
    headers: HeaderMap,
    store: Extension<DynStore>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Result<Json<SignInEmailRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::validation(MISSING_FIELDS))?;
    if is_blank(&request.email) || request.password.is_empty() {
        return Err(ApiError::validation(MISSING_FIELDS));
    }
    let credential = store
        .credential_by_email(&normalize(&request.email))
        .await
        .or_unexpected(SIGNIN_FAILED)?;
    complete_sign_in(&store, &auth_config, &headers, credential, &request.password).await
}

#[utoipa::path(
    post,
    path = "/api/auth/sign-in/username",
    request_body = SignInUsernameRequest,
    responses(
        (status = 200, description = "Signed in", body = UserResponse),
        (status = 400, description = "Missing fields", body = crate::api::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn sign_in_username(
    headers: HeaderMap,
    store: Extension<DynStore>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Result<Json<SignInUsernameRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::validation(MISSING_FIELDS))?;
    if is_blank(&request.username) || request.password.is_empty() {
        return Err(ApiError::validation(MISSING_FIELDS));
    }
    let credential = store
        .credential_by_username(&normalize(&request.username))
        .await
        .or_unexpected(SIGNIN_FAILED)?;
    complete_sign_in(&store, &auth_config, &headers, credential, &request.password).await
}

/// Unknown users, placeholder accounts and wrong passwords all get the same 401.
async fn complete_sign_in(
    store: &DynStore,
    auth_config: &AuthConfig,
    headers: &HeaderMap,
    credential: Option<Credential>,
    password: &str,
) -> Result<Response, ApiError> {
    let Some(Credential {
        user,
        password_hash: Some(password_hash),
    }) = credential
    else {
        return Err(ApiError::InvalidCredentials);
    };
    if !verify_password(password, &password_hash)
        .await
        .or_unexpected(SIGNIN_FAILED)?
    {
        return Err(ApiError::InvalidCredentials);
    }

    let cookie = open_session(store, auth_config, headers, user.id)
        .await
        .or_unexpected(SIGNIN_FAILED)?;
    info!(user_id = %user.id, "user signed in");
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    Ok((StatusCode::OK, response_headers, Json(UserResponse { user })).into_response())
}
