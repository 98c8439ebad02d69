//! Invite-gated access requests.
//!
//! Anyone can submit a request. Admins list them and approve or reject each
//! one exactly once. Approval creates the user with a password-less
//! credential account and sends a set-password link; rejection sends a
//! notice with the reviewer's notes.

pub mod admin;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    api::{
        email::{templates, EmailDispatcher},
        error::{ApiError, ResultExt},
        handlers::validation::{
            is_blank, normalize, valid_email, validate_reason, validate_username, INVALID_EMAIL,
            MISSING_FIELDS,
        },
    },
    store::{DynStore, InsertOutcome, NewAccessRequest},
};

const SUBMIT_FAILED: &str = "Failed to submit access request";
const USERNAME_TAKEN: &str = "An access request with this username already exists";
const EMAIL_TAKEN: &str = "An access request with this email already exists";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAccessRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_username: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
}

impl SubmitAccessRequest {
    /// Apply the field rules in order and return the normalized record.
    fn into_new_request(self) -> Result<NewAccessRequest, ApiError> {
        if [&self.username, &self.name, &self.email, &self.reason]
            .iter()
            .any(|field| is_blank(field))
        {
            return Err(ApiError::validation(MISSING_FIELDS));
        }

        // Username and reason are checked as sent; surrounding spaces count.
        validate_username(&self.username).map_err(ApiError::validation)?;

        let email = normalize(&self.email);
        if !valid_email(&email) {
            return Err(ApiError::validation(INVALID_EMAIL));
        }

        validate_reason(&self.reason).map_err(ApiError::validation)?;

        let display_username = self
            .display_username
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.username.clone());

        Ok(NewAccessRequest {
            username: self.username.to_lowercase(),
            display_username,
            name: self.name,
            email,
            reason: self.reason,
        })
    }
}

#[utoipa::path(
    post,
    path = "/api/access-request",
    request_body = SubmitAccessRequest,
    responses(
        (status = 201, description = "Access request submitted", body = SubmitResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorBody),
        (status = 409, description = "Username or email already requested", body = crate::api::error::ErrorBody),
        (status = 500, description = "Internal error", body = crate::api::error::ErrorBody)
    ),
    tag = "access-requests"
)]
pub async fn submit(
    store: Extension<DynStore>,
    dispatcher: Extension<EmailDispatcher>,
    payload: Result<Json<SubmitAccessRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::validation("Invalid request body"))?;
    let new_request = request.into_new_request()?;

    // Advisory checks for friendly messages; the unique keys decide.
    if store
        .access_request_by_username(&new_request.username)
        .await
        .or_unexpected(SUBMIT_FAILED)?
        .is_some()
    {
        return Err(ApiError::conflict(USERNAME_TAKEN));
    }
    if store
        .access_request_by_email(&new_request.email)
        .await
        .or_unexpected(SUBMIT_FAILED)?
        .is_some()
    {
        return Err(ApiError::conflict(EMAIL_TAKEN));
    }

    let created = match store
        .insert_access_request(new_request)
        .await
        .or_unexpected(SUBMIT_FAILED)?
    {
        InsertOutcome::Created(created) => created,
        InsertOutcome::UsernameTaken => return Err(ApiError::conflict(USERNAME_TAKEN)),
        InsertOutcome::EmailTaken => return Err(ApiError::conflict(EMAIL_TAKEN)),
    };
    info!(request_id = %created.id, username = %created.username, "access request submitted");

    dispatcher.enqueue(templates::access_request_notification(
        dispatcher.admin_email(),
        &created,
    ));

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            message: "Access request submitted successfully".to_string(),
        }),
    ))
}
