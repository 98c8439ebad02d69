//! Router harness shared by the handler tests.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Method, Request, Response,
    },
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

use super::auth::{
    session::SESSION_COOKIE_NAME,
    utils::{generate_token, hash_password, hash_token},
    AuthConfig,
};
use crate::{
    api::{
        app,
        email::{EmailDispatcher, EmailMessage},
    },
    store::{memory::MemoryStore, DynStore, NewSession, Role, SessionStore, User},
};

pub(crate) const ADMIN_EMAIL: &str = "admin@example.com";
pub(crate) const FRONTEND: &str = "http://localhost:3000";

pub(crate) struct TestApp {
    pub(crate) router: Router,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) emails: mpsc::Receiver<EmailMessage>,
}

impl TestApp {
    pub(crate) fn new() -> Result<Self> {
        Self::with_config(AuthConfig::new(FRONTEND.to_string()))
    }

    pub(crate) fn with_config(auth_config: AuthConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: DynStore = store.clone();
        let (dispatcher, emails) = EmailDispatcher::channel(32, ADMIN_EMAIL.to_string());
        let router = app(dyn_store, dispatcher, Arc::new(auth_config))?;
        Ok(Self {
            router,
            store,
            emails,
        })
    }

    pub(crate) async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    /// Everything queued since the last call.
    pub(crate) fn drain_emails(&mut self) -> Vec<EmailMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.emails.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Every later enqueue fails as if the worker had gone away.
    pub(crate) fn close_email_queue(&mut self) {
        self.emails.close();
    }

    /// Seed a user and open a session for it, returning the cookie header value.
    pub(crate) async fn signed_in(&self, username: &str, role: Role) -> Result<(User, String)> {
        let user = self.store.seed_user(
            username,
            &format!("{username}@example.com"),
            role,
            Some(hash_password("correct horse battery").await?),
        )?;
        let token = generate_token()?;
        self.store
            .create_session(NewSession {
                token_hash: hash_token(&token),
                user_id: user.id,
                expires_at: Utc::now() + Duration::hours(1),
                ip_address: None,
                user_agent: None,
            })
            .await?;
        Ok((user, format!("{SESSION_COOKIE_NAME}={token}")))
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    body: &Value,
    cookie: Option<&str>,
) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    Ok(builder.body(Body::from(serde_json::to_vec(body)?))?)
}

pub(crate) fn get_request(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    Ok(builder.body(Body::empty())?)
}

pub(crate) async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) async fn error_message(response: Response<Body>) -> Result<String> {
    let body = body_json(response).await?;
    body.get("error")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .context("response has no error field")
}

/// The `name=value` pair from the response's `Set-Cookie` header.
pub(crate) fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(ToString::to_string)
}

/// The token carried in a password link email.
pub(crate) fn link_token(message: &EmailMessage) -> Option<String> {
    let start = message.html.find("token=")? + "token=".len();
    let token: String = message.html[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!token.is_empty()).then_some(token)
}
