//! Persistence seams for users, sessions, verification tokens and access
//! requests.
//!
//! Handlers only see the traits below through an `Arc<dyn Store>` injected at
//! startup. `PgStore` is the production implementation; tests use an
//! in-memory store that enforces the same uniqueness and single-review rules.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use utoipa::ToSchema;
use uuid::Uuid;

#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;

pub use postgres::PgStore;

/// Provider id of the password-bearing account row.
pub const CREDENTIAL_PROVIDER: &str = "credential";

/// Lifecycle of an access request. `Pending` moves once, to one of the others.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccessRequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AccessRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessRequestStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(anyhow!("unknown access request status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: Uuid,
    pub username: String,
    pub display_username: Option<String>,
    pub name: String,
    pub email: String,
    pub reason: String,
    pub status: AccessRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewer_notes: Option<String>,
}

impl AccessRequest {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == AccessRequestStatus::Pending
    }
}

/// Already-normalized fields for a new pending request.
#[derive(Clone, Debug)]
pub struct NewAccessRequest {
    pub username: String,
    pub display_username: String,
    pub name: String,
    pub email: String,
    pub reason: String,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(AccessRequest),
    UsernameTaken,
    EmailTaken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Clone, Debug)]
pub struct Review {
    pub id: Uuid,
    pub decision: ReviewDecision,
    pub reviewer: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug)]
pub enum ReviewOutcome {
    /// The request, the new user and its placeholder credential were written together.
    Approved { request: AccessRequest, user: User },
    Rejected { request: AccessRequest },
    NotFound,
    NotPending,
    /// Approval would collide with an existing user; nothing was written.
    UserConflict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(anyhow!("unknown role: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_username: Option<String>,
    pub name: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub display_username: Option<String>,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
}

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    Conflict,
}

/// A user together with the hash on its credential account, if any.
#[derive(Clone, Debug)]
pub struct Credential {
    pub user: User,
    pub password_hash: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Minimal data returned for a live session token.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccessRequestStore: Send + Sync {
    async fn access_request_by_username(&self, username: &str) -> Result<Option<AccessRequest>>;

    async fn access_request_by_email(&self, email: &str) -> Result<Option<AccessRequest>>;

    /// Insert a pending request. Storage-level uniqueness is authoritative.
    async fn insert_access_request(&self, request: NewAccessRequest) -> Result<InsertOutcome>;

    /// Every pending request first, newest `requested_at` first inside each
    /// group.
    async fn list_access_requests(&self) -> Result<Vec<AccessRequest>>;

    /// Apply a review. Only a pending request can be reviewed, and approval
    /// creates the user, its placeholder credential and the status change as
    /// one unit.
    async fn review_access_request(&self, review: Review) -> Result<ReviewOutcome>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn credential_by_email(&self, email: &str) -> Result<Option<Credential>>;

    async fn credential_by_username(&self, username: &str) -> Result<Option<Credential>>;

    /// Create a user and its credential account.
    async fn create_user(
        &self,
        user: NewUser,
        password_hash: Option<String>,
    ) -> Result<CreateUserOutcome>;

    /// Set the password on the user's credential account, creating it if missing.
    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: NewSession) -> Result<()>;

    /// Resolve a token hash; expired sessions resolve to `None`.
    async fn lookup_session(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>>;

    async fn delete_session(&self, token_hash: &[u8]) -> Result<()>;

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn insert_verification(
        &self,
        identifier: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Remove the token and return its identifier if it had not expired.
    async fn consume_verification(&self, token_hash: &[u8]) -> Result<Option<String>>;
}

#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Round-trip to the backing database.
    async fn ping(&self) -> Result<()>;
}

pub trait Store:
    AccessRequestStore + AccountStore + SessionStore + VerificationStore + HealthStore
{
}

impl<T> Store for T where
    T: AccessRequestStore + AccountStore + SessionStore + VerificationStore + HealthStore
{
}

pub type DynStore = Arc<dyn Store>;
