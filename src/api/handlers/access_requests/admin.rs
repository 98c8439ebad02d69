//! Admin listing and review of access requests.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        email::{
            templates::{self, PasswordLinkKind},
            EmailDispatcher,
        },
        error::{ApiError, ResultExt},
        handlers::{
            auth::{password::initiate_password_reset, principal::require_admin, AuthConfig},
            validation::MISSING_FIELDS,
        },
    },
    store::{AccessRequest, DynStore, Review, ReviewDecision, ReviewOutcome},
};

const LIST_FAILED: &str = "Failed to fetch access requests";
const REVIEW_FAILED: &str = "Failed to review access request";
const NOT_FOUND: &str = "Access request not found";

#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse {
    pub requests: Vec<AccessRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(default)]
    pub id: String,
    /// `approve` or `reject`.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewResponse {
    pub success: bool,
    pub message: String,
    /// Requester email the notification went to.
    pub email: String,
}

#[utoipa::path(
    get,
    path = "/api/admin/access-requests",
    responses(
        (status = 200, description = "All requests, pending first then newest first", body = ListResponse),
        (status = 401, description = "No session", body = crate::api::error::ErrorBody),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ErrorBody),
        (status = 500, description = "Internal error", body = crate::api::error::ErrorBody)
    ),
    tag = "admin"
)]
pub async fn list(
    headers: HeaderMap,
    store: Extension<DynStore>,
) -> Result<Json<ListResponse>, ApiError> {
    require_admin(&headers, &store, LIST_FAILED).await?;
    let requests = store
        .list_access_requests()
        .await
        .or_unexpected(LIST_FAILED)?;
    Ok(Json(ListResponse { requests }))
}

impl ReviewRequest {
    fn into_review(self, reviewer: Uuid) -> Result<Review, ApiError> {
        let id = self.id.trim();
        let action = self.action.trim();
        if id.is_empty() || action.is_empty() {
            return Err(ApiError::validation(MISSING_FIELDS));
        }
        let decision = match action {
            "approve" => ReviewDecision::Approve,
            "reject" => ReviewDecision::Reject,
            _ => return Err(ApiError::validation("Invalid action")),
        };
        // No request can have a malformed id.
        let id = Uuid::parse_str(id).map_err(|_| ApiError::NotFound(NOT_FOUND.to_string()))?;
        // Stored verbatim; only an absent or empty value means no notes.
        let notes = self.reviewer_notes.filter(|notes| !notes.is_empty());
        Ok(Review {
            id,
            decision,
            reviewer,
            notes,
        })
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/access-requests",
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Request reviewed", body = ReviewResponse),
        (status = 400, description = "Invalid input or already reviewed", body = crate::api::error::ErrorBody),
        (status = 401, description = "No session", body = crate::api::error::ErrorBody),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ErrorBody),
        (status = 404, description = "Access request not found", body = crate::api::error::ErrorBody),
        (status = 409, description = "A user with this username or email already exists", body = crate::api::error::ErrorBody),
        (status = 500, description = "Internal error", body = crate::api::error::ErrorBody)
    ),
    tag = "admin"
)]
pub async fn review(
    headers: HeaderMap,
    store: Extension<DynStore>,
    dispatcher: Extension<EmailDispatcher>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    let principal = require_admin(&headers, &store, REVIEW_FAILED).await?;
    let Json(request) = payload.map_err(|_| ApiError::validation(MISSING_FIELDS))?;
    let review = request.into_review(principal.user.id)?;
    let request_id = review.id;

    let outcome = store
        .review_access_request(review)
        .await
        .or_unexpected(REVIEW_FAILED)?;

    let response = match outcome {
        ReviewOutcome::NotFound => return Err(ApiError::NotFound(NOT_FOUND.to_string())),
        ReviewOutcome::NotPending => return Err(ApiError::AlreadyReviewed),
        ReviewOutcome::UserConflict => {
            return Err(ApiError::conflict(
                "A user with this username or email already exists",
            ))
        }
        ReviewOutcome::Approved { request, user } => {
            info!(
                %request_id,
                user_id = %user.id,
                reviewer = %principal.user.id,
                "access request approved"
            );
            // The approval is committed; a failed invite is only logged.
            if let Err(err) = initiate_password_reset(
                &store,
                &dispatcher,
                &auth_config,
                &user.email,
                PasswordLinkKind::Invite,
            )
            .await
            {
                error!(%request_id, "Failed to send password reset email: {err:#}");
            }
            ReviewResponse {
                success: true,
                message: "Access request approved, user created, and password reset email sent"
                    .to_string(),
                email: request.email,
            }
        }
        ReviewOutcome::Rejected { request } => {
            info!(%request_id, reviewer = %principal.user.id, "access request rejected");
            dispatcher.enqueue(templates::rejection(
                &request.email,
                &request.name,
                request.reviewer_notes.as_deref(),
            ));
            ReviewResponse {
                success: true,
                message: "Access request rejected and notification email sent".to_string(),
                email: request.email,
            }
        }
    };
    Ok((StatusCode::OK, Json(response)))
}
