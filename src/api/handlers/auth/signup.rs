//! Direct sign-up. Off unless the server runs with `--allow-signup`; the
//! normal path to an account is an approved access request.

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
    types::{SignUpRequest, UserResponse},
    utils::{hash_password, validate_password},
};
use crate::{
    api::{
        error::{ApiError, ResultExt},
        handlers::validation::{
            is_blank, normalize, valid_email, validate_username, INVALID_EMAIL, MISSING_FIELDS,
        },
    },
    store::{CreateUserOutcome, DynStore, NewUser, Role},
};

const SIGNUP_DISABLED: &str = "Sign-up is disabled; request access instead";
const SIGNUP_FAILED: &str = "Failed to sign up";

#[utoipa::path(
    post,
    path = "/api/auth/sign-up/email",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created and session opened", body = UserResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorBody),
        (status = 403, description = "Sign-up is disabled", body = crate::api::error::ErrorBody),
        (status = 409, description = "Username or email already taken", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn sign_up(
    headers: HeaderMap,
    store: Extension<DynStore>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    if !auth_config.allow_signup() {
        return Err(ApiError::Forbidden(SIGNUP_DISABLED.to_string()));
    }
    let Json(request) = payload.map_err(|_| ApiError::validation(MISSING_FIELDS))?;

    if [&request.name, &request.email, &request.password, &request.username]
        .iter()
        .any(|field| is_blank(field))
    {
        return Err(ApiError::validation(MISSING_FIELDS));
    }
    let raw_username = request.username.trim();
    validate_username(raw_username).map_err(ApiError::validation)?;
    let email = normalize(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation(INVALID_EMAIL));
    }
    validate_password(&request.password).map_err(ApiError::Validation)?;

    let display_username = request
        .display_username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(raw_username)
        .to_string();
    let new_user = NewUser {
        username: normalize(raw_username),
        display_username: Some(display_username),
        name: Some(request.name.trim().to_string()),
        email,
        role: Role::User,
    };
    let password_hash = hash_password(&request.password)
        .await
        .or_unexpected(SIGNUP_FAILED)?;
    let user = match store
        .create_user(new_user, Some(password_hash))
        .await
        .or_unexpected(SIGNUP_FAILED)?
    {
        CreateUserOutcome::Created(user) => user,
        CreateUserOutcome::Conflict => {
            return Err(ApiError::conflict(
                "A user with this username or email already exists",
            ))
        }
    };
    info!(user_id = %user.id, "user signed up");

    let cookie = open_session(&store, &auth_config, &headers, user.id)
        .await
        .or_unexpected(SIGNUP_FAILED)?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    Ok((
        StatusCode::CREATED,
        response_headers,
        Json(UserResponse { user }),
    )
        .into_response())
}
