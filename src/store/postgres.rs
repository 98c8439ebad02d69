//! `PostgreSQL` implementation of the store traits.
//!
//! Every statement runs inside a `db.query` span so request traces show the
//! SQL that was executed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Postgres, Row, Transaction};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    AccessRequest, AccessRequestStore, AccountStore, CreateUserOutcome, Credential,
    HealthStore, InsertOutcome, NewAccessRequest, NewSession, NewUser, Review, ReviewDecision,
    ReviewOutcome, Role, SessionRecord, SessionStore, User, VerificationStore,
    CREDENTIAL_PROVIDER,
};

const UNIQUE_VIOLATION: &str = "23505";
const ACCESS_REQUEST_USERNAME_KEY: &str = "access_requests_username_key";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION),
        _ => false,
    }
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

fn access_request_from_row(row: &PgRow) -> Result<AccessRequest> {
    let status: String = row.try_get("status")?;
    Ok(AccessRequest {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_username: row.try_get("display_username")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        reason: row.try_get("reason")?,
        status: status.parse()?,
        requested_at: row.try_get("requested_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewer_notes: row.try_get("reviewer_notes")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_username: row.try_get("display_username")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        email_verified: row.try_get("email_verified")?,
        role: role.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn credential_from_row(row: &PgRow) -> Result<Credential> {
    Ok(Credential {
        user: user_from_row(row)?,
        password_hash: row.try_get("password")?,
    })
}

async fn fetch_access_request(
    pool: &PgPool,
    query: &'static str,
    value: &str,
) -> Result<Option<AccessRequest>> {
    let row = sqlx::query(query)
        .bind(value)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await
        .context("failed to lookup access request")?;
    row.as_ref().map(access_request_from_row).transpose()
}

async fn insert_user_tx(
    tx: &mut Transaction<'_, Postgres>,
    user: &NewUser,
    password_hash: Option<&str>,
) -> Result<Option<User>> {
    let query = r"
        INSERT INTO users
            (id, username, display_username, name, email, email_verified, role)
        VALUES ($1, $2, $3, $4, $5, FALSE, $6)
        RETURNING id, username, display_username, name, email, email_verified, role, created_at
    ";
    let row = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.display_username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .fetch_one(&mut **tx)
        .instrument(db_span("INSERT", query))
        .await;

    let created = match row {
        Ok(row) => user_from_row(&row)?,
        Err(err) if is_unique_violation(&err) => return Ok(None),
        Err(err) => return Err(err).context("failed to insert user"),
    };

    let query = r"
        INSERT INTO accounts (id, account_id, provider_id, user_id, password)
        VALUES ($1, $2, $3, $4, $5)
    ";
    sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(&created.email)
        .bind(CREDENTIAL_PROVIDER)
        .bind(created.id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to insert credential account")?;

    Ok(Some(created))
}

#[async_trait]
impl AccessRequestStore for PgStore {
    async fn access_request_by_username(&self, username: &str) -> Result<Option<AccessRequest>> {
        let query = r"
            SELECT id, username, display_username, name, email, reason, status,
                   requested_at, reviewed_at, reviewed_by, reviewer_notes
            FROM access_requests
            WHERE username = $1
            LIMIT 1
        ";
        fetch_access_request(&self.pool, query, username).await
    }

    async fn access_request_by_email(&self, email: &str) -> Result<Option<AccessRequest>> {
        let query = r"
            SELECT id, username, display_username, name, email, reason, status,
                   requested_at, reviewed_at, reviewed_by, reviewer_notes
            FROM access_requests
            WHERE email = $1
            LIMIT 1
        ";
        fetch_access_request(&self.pool, query, email).await
    }

    async fn insert_access_request(&self, request: NewAccessRequest) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO access_requests
                (id, username, display_username, name, email, reason, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING id, username, display_username, name, email, reason, status,
                      requested_at, reviewed_at, reviewed_by, reviewer_notes
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&request.username)
            .bind(&request.display_username)
            .bind(&request.name)
            .bind(&request.email)
            .bind(&request.reason)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(InsertOutcome::Created(access_request_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => {
                if violated_constraint(&err) == Some(ACCESS_REQUEST_USERNAME_KEY) {
                    Ok(InsertOutcome::UsernameTaken)
                } else {
                    Ok(InsertOutcome::EmailTaken)
                }
            }
            Err(err) => Err(err).context("failed to insert access request"),
        }
    }

    async fn list_access_requests(&self) -> Result<Vec<AccessRequest>> {
        let query = r"
            SELECT id, username, display_username, name, email, reason, status,
                   requested_at, reviewed_at, reviewed_by, reviewer_notes
            FROM access_requests
            ORDER BY (status = 'pending') DESC, requested_at DESC
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list access requests")?;
        rows.iter().map(access_request_from_row).collect()
    }

    async fn review_access_request(&self, review: Review) -> Result<ReviewOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin review transaction")?;

        // Lock the row so concurrent reviews serialize on it.
        let query = r"
            SELECT id, username, display_username, name, email, reason, status,
                   requested_at, reviewed_at, reviewed_by, reviewer_notes
            FROM access_requests
            WHERE id = $1
            FOR UPDATE
        ";
        let row = sqlx::query(query)
            .bind(review.id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lock access request")?;

        // Early returns drop `tx`, which rolls it back.
        let Some(current) = row.as_ref().map(access_request_from_row).transpose()? else {
            return Ok(ReviewOutcome::NotFound);
        };
        if !current.is_pending() {
            return Ok(ReviewOutcome::NotPending);
        }

        let user = match review.decision {
            ReviewDecision::Approve => {
                let new_user = NewUser {
                    username: current.username.clone(),
                    display_username: current.display_username.clone(),
                    name: Some(current.name.clone()),
                    email: current.email.clone(),
                    role: Role::User,
                };
                match insert_user_tx(&mut tx, &new_user, None).await? {
                    Some(user) => Some(user),
                    None => return Ok(ReviewOutcome::UserConflict),
                }
            }
            ReviewDecision::Reject => None,
        };

        let status = match review.decision {
            ReviewDecision::Approve => "approved",
            ReviewDecision::Reject => "rejected",
        };
        let query = r"
            UPDATE access_requests
            SET status = $2,
                reviewed_at = NOW(),
                reviewed_by = $3,
                reviewer_notes = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, username, display_username, name, email, reason, status,
                      requested_at, reviewed_at, reviewed_by, reviewer_notes
        ";
        let row = sqlx::query(query)
            .bind(review.id)
            .bind(status)
            .bind(review.reviewer)
            .bind(&review.notes)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update access request status")?;

        let Some(row) = row else {
            return Ok(ReviewOutcome::NotPending);
        };
        let request = access_request_from_row(&row)?;

        tx.commit().await.context("commit review transaction")?;

        Ok(match user {
            Some(user) => ReviewOutcome::Approved { request, user },
            None => ReviewOutcome::Rejected { request },
        })
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, username, display_username, name, email, email_verified, role, created_at
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, username, display_username, name, email, email_verified, role, created_at
            FROM users
            WHERE email = $1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn credential_by_email(&self, email: &str) -> Result<Option<Credential>> {
        let query = r"
            SELECT u.id, u.username, u.display_username, u.name, u.email, u.email_verified,
                   u.role, u.created_at, a.password
            FROM users u
            LEFT JOIN accounts a ON a.user_id = u.id AND a.provider_id = 'credential'
            WHERE u.email = $1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup credential by email")?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn credential_by_username(&self, username: &str) -> Result<Option<Credential>> {
        let query = r"
            SELECT u.id, u.username, u.display_username, u.name, u.email, u.email_verified,
                   u.role, u.created_at, a.password
            FROM users u
            LEFT JOIN accounts a ON a.user_id = u.id AND a.provider_id = 'credential'
            WHERE u.username = $1
        ";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup credential by username")?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn create_user(
        &self,
        user: NewUser,
        password_hash: Option<String>,
    ) -> Result<CreateUserOutcome> {
        let mut tx = self.pool.begin().await.context("begin signup transaction")?;

        let Some(created) = insert_user_tx(&mut tx, &user, password_hash.as_deref()).await? else {
            return Ok(CreateUserOutcome::Conflict);
        };

        tx.commit().await.context("commit signup transaction")?;

        Ok(CreateUserOutcome::Created(created))
    }

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let query = r"
            INSERT INTO accounts (id, account_id, provider_id, user_id, password)
            SELECT $1, u.email, 'credential', u.id, $3
            FROM users u
            WHERE u.id = $2
            ON CONFLICT (user_id, provider_id)
            DO UPDATE SET password = EXCLUDED.password, updated_at = NOW()
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to store password")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("user {user_id} not found while storing password");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: NewSession) -> Result<()> {
        let query = r"
            INSERT INTO sessions (id, token_hash, user_id, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&session.token_hash)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn lookup_session(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let query = r"
            SELECT user_id, expires_at
            FROM sessions
            WHERE token_hash = $1 AND expires_at > NOW()
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        row.map(|row| -> Result<SessionRecord> {
            Ok(SessionRecord {
                user_id: row.try_get("user_id")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE user_id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete user sessions")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VerificationStore for PgStore {
    async fn insert_verification(
        &self,
        identifier: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO verifications (id, identifier, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
        ";
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(identifier)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert verification token")?;
        Ok(())
    }

    async fn consume_verification(&self, token_hash: &[u8]) -> Result<Option<String>> {
        let query = r"
            DELETE FROM verifications
            WHERE token_hash = $1
            RETURNING identifier, expires_at
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to consume verification token")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        if expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(row.try_get("identifier")?))
    }
}

#[async_trait]
impl HealthStore for PgStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
