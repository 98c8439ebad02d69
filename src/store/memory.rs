//! In-memory store used by handler tests. Enforces the same unique keys and
//! single-review rule as the SQL schema.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    cmp,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};
use uuid::Uuid;

use super::{
    AccessRequest, AccessRequestStatus, AccessRequestStore, AccountStore,
    CreateUserOutcome, Credential, HealthStore, InsertOutcome, NewAccessRequest, NewSession,
    NewUser, Review, ReviewDecision, ReviewOutcome, Role, SessionRecord, SessionStore, User,
    VerificationStore,
};

/// Same order as the `ORDER BY` in `PgStore::list_access_requests`.
fn listing_order(a: &AccessRequest, b: &AccessRequest) -> cmp::Ordering {
    b.is_pending()
        .cmp(&a.is_pending())
        .then_with(|| b.requested_at.cmp(&a.requested_at))
}

#[derive(Default)]
struct State {
    access_requests: Vec<AccessRequest>,
    users: Vec<User>,
    /// Credential account password per user id; `None` is a placeholder.
    credentials: HashMap<Uuid, Option<String>>,
    sessions: HashMap<Vec<u8>, SessionRecord>,
    verifications: HashMap<Vec<u8>, (String, DateTime<Utc>)>,
}

impl State {
    fn user_taken(&self, username: &str, email: &str) -> bool {
        self.users
            .iter()
            .any(|user| user.username == username || user.email == email)
    }

    fn insert_user(&mut self, new_user: NewUser, password_hash: Option<String>) -> Option<User> {
        if self.user_taken(&new_user.username, &new_user.email) {
            return None;
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            display_username: new_user.display_username,
            name: new_user.name,
            email: new_user.email,
            email_verified: false,
            role: new_user.role,
            created_at: Utc::now(),
        };
        self.credentials.insert(user.id, password_hash);
        self.users.push(user.clone());
        Some(user)
    }

    fn credential(&self, user: Option<&User>) -> Option<Credential> {
        user.map(|user| Credential {
            user: user.clone(),
            password_hash: self.credentials.get(&user.id).cloned().flatten(),
        })
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    unhealthy: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        match self.state.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => bail!("memory store lock poisoned"),
        }
    }

    /// Seed a user directly, bypassing sign-up rules.
    pub(crate) fn seed_user(
        &self,
        username: &str,
        email: &str,
        role: Role,
        password_hash: Option<String>,
    ) -> Result<User> {
        let new_user = NewUser {
            username: username.to_string(),
            display_username: Some(username.to_string()),
            name: Some(username.to_string()),
            email: email.to_string(),
            role,
        };
        match self.lock()?.insert_user(new_user, password_hash) {
            Some(user) => Ok(user),
            None => bail!("user {username} already exists"),
        }
    }

    /// Seed a request with an explicit status and timestamp.
    pub(crate) fn seed_access_request(
        &self,
        username: &str,
        status: AccessRequestStatus,
        requested_at: DateTime<Utc>,
    ) -> Result<AccessRequest> {
        let request = AccessRequest {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_username: Some(username.to_string()),
            name: username.to_string(),
            email: format!("{username}@example.com"),
            reason: "I need access for the quarterly audit".to_string(),
            status,
            requested_at,
            reviewed_at: None,
            reviewed_by: None,
            reviewer_notes: None,
        };
        self.lock()?.access_requests.push(request.clone());
        Ok(request)
    }

    pub(crate) fn access_request(&self, id: Uuid) -> Result<Option<AccessRequest>> {
        Ok(self
            .lock()?
            .access_requests
            .iter()
            .find(|request| request.id == id)
            .cloned())
    }

    pub(crate) fn users(&self) -> Result<Vec<User>> {
        Ok(self.lock()?.users.clone())
    }

    pub(crate) fn password_hash(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.lock()?.credentials.get(&user_id).cloned().flatten())
    }

    pub(crate) fn has_credential_account(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.lock()?.credentials.contains_key(&user_id))
    }

    pub(crate) fn session_count(&self) -> Result<usize> {
        Ok(self.lock()?.sessions.len())
    }

    /// Make `ping` fail, as if the database were unreachable.
    pub(crate) fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccessRequestStore for MemoryStore {
    async fn access_request_by_username(&self, username: &str) -> Result<Option<AccessRequest>> {
        let state = self.lock()?;
        Ok(state
            .access_requests
            .iter()
            .find(|request| request.username == username)
            .cloned())
    }

    async fn access_request_by_email(&self, email: &str) -> Result<Option<AccessRequest>> {
        let state = self.lock()?;
        Ok(state
            .access_requests
            .iter()
            .find(|request| request.email == email)
            .cloned())
    }

    async fn insert_access_request(&self, request: NewAccessRequest) -> Result<InsertOutcome> {
        let mut state = self.lock()?;
        if state
            .access_requests
            .iter()
            .any(|existing| existing.username == request.username)
        {
            return Ok(InsertOutcome::UsernameTaken);
        }
        if state
            .access_requests
            .iter()
            .any(|existing| existing.email == request.email)
        {
            return Ok(InsertOutcome::EmailTaken);
        }
        let created = AccessRequest {
            id: Uuid::new_v4(),
            username: request.username,
            display_username: Some(request.display_username),
            name: request.name,
            email: request.email,
            reason: request.reason,
            status: AccessRequestStatus::Pending,
            requested_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            reviewer_notes: None,
        };
        state.access_requests.push(created.clone());
        Ok(InsertOutcome::Created(created))
    }

    async fn list_access_requests(&self) -> Result<Vec<AccessRequest>> {
        let mut requests = self.lock()?.access_requests.clone();
        requests.sort_by(listing_order);
        Ok(requests)
    }

    async fn review_access_request(&self, review: Review) -> Result<ReviewOutcome> {
        let mut state = self.lock()?;
        let Some(index) = state
            .access_requests
            .iter()
            .position(|request| request.id == review.id)
        else {
            return Ok(ReviewOutcome::NotFound);
        };
        if !state.access_requests[index].is_pending() {
            return Ok(ReviewOutcome::NotPending);
        }

        let user = match review.decision {
            ReviewDecision::Approve => {
                let current = &state.access_requests[index];
                let new_user = NewUser {
                    username: current.username.clone(),
                    display_username: current.display_username.clone(),
                    name: Some(current.name.clone()),
                    email: current.email.clone(),
                    role: Role::User,
                };
                match state.insert_user(new_user, None) {
                    Some(user) => Some(user),
                    None => return Ok(ReviewOutcome::UserConflict),
                }
            }
            ReviewDecision::Reject => None,
        };

        let request = &mut state.access_requests[index];
        request.status = match review.decision {
            ReviewDecision::Approve => AccessRequestStatus::Approved,
            ReviewDecision::Reject => AccessRequestStatus::Rejected,
        };
        request.reviewed_at = Some(Utc::now());
        request.reviewed_by = Some(review.reviewer);
        request.reviewer_notes = review.notes;
        let request = request.clone();

        Ok(match user {
            Some(user) => ReviewOutcome::Approved { request, user },
            None => ReviewOutcome::Rejected { request },
        })
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state.users.iter().find(|user| user.email == email).cloned())
    }

    async fn credential_by_email(&self, email: &str) -> Result<Option<Credential>> {
        let state = self.lock()?;
        Ok(state.credential(state.users.iter().find(|user| user.email == email)))
    }

    async fn credential_by_username(&self, username: &str) -> Result<Option<Credential>> {
        let state = self.lock()?;
        Ok(state.credential(state.users.iter().find(|user| user.username == username)))
    }

    async fn create_user(
        &self,
        user: NewUser,
        password_hash: Option<String>,
    ) -> Result<CreateUserOutcome> {
        Ok(match self.lock()?.insert_user(user, password_hash) {
            Some(user) => CreateUserOutcome::Created(user),
            None => CreateUserOutcome::Conflict,
        })
    }

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut state = self.lock()?;
        if !state.users.iter().any(|user| user.id == user_id) {
            bail!("user {user_id} not found while storing password");
        }
        state
            .credentials
            .insert(user_id, Some(password_hash.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: NewSession) -> Result<()> {
        self.lock()?.sessions.insert(
            session.token_hash,
            SessionRecord {
                user_id: session.user_id,
                expires_at: session.expires_at,
            },
        );
        Ok(())
    }

    async fn lookup_session(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .get(token_hash)
            .filter(|record| record.expires_at > Utc::now())
            .cloned())
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<()> {
        self.lock()?.sessions.remove(token_hash);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        let mut state = self.lock()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, record| record.user_id != user_id);
        Ok(u64::try_from(before - state.sessions.len()).unwrap_or(0))
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn insert_verification(
        &self,
        identifier: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock()?
            .verifications
            .insert(token_hash.to_vec(), (identifier.to_string(), expires_at));
        Ok(())
    }

    async fn consume_verification(&self, token_hash: &[u8]) -> Result<Option<String>> {
        let removed = self.lock()?.verifications.remove(token_hash);
        Ok(removed
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(identifier, _)| identifier))
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        if self.unhealthy.load(Ordering::SeqCst) {
            bail!("database unavailable");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(status: AccessRequestStatus, minutes_ago: i64) -> AccessRequest {
        AccessRequest {
            id: Uuid::new_v4(),
            username: format!("user{minutes_ago}"),
            display_username: None,
            name: "Name".to_string(),
            email: format!("user{minutes_ago}@example.com"),
            reason: "x".repeat(20),
            status,
            requested_at: Utc::now() - Duration::minutes(minutes_ago),
            reviewed_at: None,
            reviewed_by: None,
            reviewer_notes: None,
        }
    }

    #[tokio::test]
    async fn listing_puts_pending_first_then_newest() -> Result<()> {
        let store = MemoryStore::new();
        for (status, minutes_ago) in [
            (AccessRequestStatus::Approved, 1),
            (AccessRequestStatus::Pending, 30),
            (AccessRequestStatus::Rejected, 5),
            (AccessRequestStatus::Pending, 10),
        ] {
            store
                .lock()?
                .access_requests
                .push(request(status, minutes_ago));
        }

        let order: Vec<(AccessRequestStatus, String)> = store
            .list_access_requests()
            .await?
            .into_iter()
            .map(|r| (r.status, r.username))
            .collect();
        assert_eq!(
            order,
            vec![
                (AccessRequestStatus::Pending, "user10".to_string()),
                (AccessRequestStatus::Pending, "user30".to_string()),
                (AccessRequestStatus::Approved, "user1".to_string()),
                (AccessRequestStatus::Rejected, "user5".to_string()),
            ]
        );
        Ok(())
    }
}
