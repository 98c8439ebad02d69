//! Authenticated principal extraction and authorization helpers.
//!
//! The role is read from the user row on every call, never from the session,
//! so a demoted admin loses access on their next request.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use super::session::authenticate_session;
use crate::{
    api::error::{ApiError, ResultExt},
    store::{DynStore, Role, User},
};

#[derive(Clone, Debug)]
pub struct Principal {
    pub user: User,
    pub session_expires_at: DateTime<Utc>,
}

impl Principal {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }
}

/// Resolve the session into a principal, or 401 when there is none.
/// Store failures surface as `on_error`.
pub async fn require_auth(
    headers: &HeaderMap,
    store: &DynStore,
    on_error: &'static str,
) -> Result<Principal, ApiError> {
    let Some(record) = authenticate_session(headers, store)
        .await
        .or_unexpected(on_error)?
    else {
        return Err(ApiError::Unauthorized);
    };
    let Some(user) = store.user_by_id(record.user_id).await.or_unexpected(on_error)? else {
        return Err(ApiError::Unauthorized);
    };
    Ok(Principal {
        user,
        session_expires_at: record.expires_at,
    })
}

/// `require_auth` plus a 403 for non-admins.
pub async fn require_admin(
    headers: &HeaderMap,
    store: &DynStore,
    on_error: &'static str,
) -> Result<Principal, ApiError> {
    let principal = require_auth(headers, store, on_error).await?;
    if principal.is_admin() {
        Ok(principal)
    } else {
        Err(ApiError::admin_required())
    }
}
