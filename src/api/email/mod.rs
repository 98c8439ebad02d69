//! Fire-and-forget email delivery.
//!
//! Handlers build an `EmailMessage` from one of the templates and hand it to
//! the `EmailDispatcher`, which pushes it onto a bounded in-process queue with
//! `try_send`. A single worker task drains the queue and calls the configured
//! `EmailSender`. Nothing on the request path waits for delivery:
//!
//! - a full or closed queue drops the message and logs it;
//! - a delivery error is logged and the message is not retried.
//!
//! `ResendEmailSender` talks to the Resend HTTP API. When no API key is
//! configured the server falls back to `LogEmailSender`, which only logs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{error, info, info_span, warn, Instrument};

pub mod templates;

pub const RESEND_API_URL: &str = "https://api.resend.com/emails";
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    /// Template name, only used for logs.
    pub template: &'static str,
}

/// Email delivery abstraction used by the dispatch worker.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return the provider error.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = ?message.to,
            subject = %message.subject,
            template = message.template,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

/// Sends through the Resend HTTP API.
pub struct ResendEmailSender {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    from: String,
}

impl ResendEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, from: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build email HTTP client")?;
        Ok(Self {
            client,
            endpoint: RESEND_API_URL.to_string(),
            api_key,
            from,
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl std::fmt::Debug for ResendEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendEmailSender")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("from", &self.from)
            .finish()
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload = ResendPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("email provider request failed")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("email provider returned {status}: {body}"))
    }
}

/// Sender selection and queue sizing for the email worker.
#[derive(Clone, Debug)]
pub struct EmailConfig {
    from: String,
    admin_email: String,
    resend_api_key: Option<SecretString>,
    queue_capacity: usize,
}

impl EmailConfig {
    #[must_use]
    pub fn new(from: String, admin_email: String) -> Self {
        Self {
            from,
            admin_email,
            resend_api_key: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_resend_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.resend_api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn from_address(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Resend when an API key is configured, otherwise log only.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn sender(&self) -> Result<Arc<dyn EmailSender>> {
        match &self.resend_api_key {
            Some(api_key) => Ok(Arc::new(ResendEmailSender::new(
                api_key.clone(),
                self.from.clone(),
            )?)),
            None => {
                warn!("no email API key configured; outbound email is only logged");
                Ok(Arc::new(LogEmailSender))
            }
        }
    }
}

/// Handle used by handlers to queue outbound email.
#[derive(Clone, Debug)]
pub struct EmailDispatcher {
    tx: mpsc::Sender<EmailMessage>,
    admin_email: String,
}

impl EmailDispatcher {
    /// Create the dispatcher and the receiving end of its queue.
    #[must_use]
    pub fn channel(capacity: usize, admin_email: String) -> (Self, mpsc::Receiver<EmailMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, admin_email }, rx)
    }

    /// Create the dispatcher and spawn the worker that drains it.
    #[must_use]
    pub fn spawn(
        capacity: usize,
        admin_email: String,
        sender: Arc<dyn EmailSender>,
    ) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel(capacity, admin_email);
        let handle = spawn_worker(rx, sender);
        (dispatcher, handle)
    }

    #[must_use]
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Queue a message without waiting. Returns whether it was accepted.
    pub fn enqueue(&self, message: EmailMessage) -> bool {
        let template = message.template;
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    template,
                    to = ?message.to,
                    "email queue full; dropping message"
                );
                false
            }
            Err(TrySendError::Closed(message)) => {
                error!(
                    template,
                    to = ?message.to,
                    "email queue closed; dropping message"
                );
                false
            }
        }
    }
}

/// Drain the queue until every dispatcher handle is dropped.
pub fn spawn_worker(
    mut rx: mpsc::Receiver<EmailMessage>,
    sender: Arc<dyn EmailSender>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let span = info_span!(
                "email.send",
                template = message.template,
                recipients = message.to.len()
            );
            match sender.send(&message).instrument(span).await {
                Ok(()) => info!(template = message.template, "email sent"),
                Err(err) => error!(
                    template = message.template,
                    to = ?message.to,
                    "failed to send email: {err:#}"
                ),
            }
        }
        info!("email worker stopped");
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingEmailSender;
    use super::*;

    fn message(subject: &str) -> EmailMessage {
        EmailMessage {
            to: vec!["someone@example.com".to_string()],
            subject: subject.to_string(),
            html: "<p>hi</p>".to_string(),
            template: "test",
        }
    }

    #[tokio::test]
    async fn enqueue_drops_when_full() {
        let (dispatcher, mut rx) = EmailDispatcher::channel(1, "admin@example.com".to_string());
        assert!(dispatcher.enqueue(message("first")));
        assert!(!dispatcher.enqueue(message("second")));
        assert_eq!(rx.recv().await.map(|m| m.subject), Some("first".to_string()));
    }

    #[tokio::test]
    async fn enqueue_reports_closed_queue() {
        let (dispatcher, rx) = EmailDispatcher::channel(4, "admin@example.com".to_string());
        drop(rx);
        assert!(!dispatcher.enqueue(message("lost")));
    }

    #[tokio::test]
    async fn worker_delivers_queued_messages() -> anyhow::Result<()> {
        let sender = Arc::new(RecordingEmailSender::default());
        let (dispatcher, handle) =
            EmailDispatcher::spawn(4, "admin@example.com".to_string(), sender.clone());
        assert!(dispatcher.enqueue(message("hello")));
        drop(dispatcher);
        handle.await?;

        let sent = sender
            .sent
            .lock()
            .map_err(|_| anyhow!("lock poisoned"))?
            .clone();
        assert_eq!(sent, vec![message("hello")]);
        Ok(())
    }

    #[tokio::test]
    async fn worker_survives_delivery_errors() -> anyhow::Result<()> {
        let sender = Arc::new(RecordingEmailSender {
            fail: true,
            ..RecordingEmailSender::default()
        });
        let (dispatcher, handle) =
            EmailDispatcher::spawn(4, "admin@example.com".to_string(), sender);
        assert!(dispatcher.enqueue(message("one")));
        assert!(dispatcher.enqueue(message("two")));
        drop(dispatcher);
        handle.await?;
        Ok(())
    }

    #[test]
    fn config_defaults_to_log_sender_and_default_capacity() -> anyhow::Result<()> {
        let config = EmailConfig::new(
            "noreply@gatehouse.dev".to_string(),
            "admin@gatehouse.dev".to_string(),
        );
        assert_eq!(config.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.admin_email(), "admin@gatehouse.dev");
        config.sender()?;
        Ok(())
    }

    #[test]
    fn resend_sender_debug_hides_key() -> anyhow::Result<()> {
        let sender = ResendEmailSender::new(
            SecretString::from("re_secret".to_string()),
            "Gatehouse <noreply@gatehouse.dev>".to_string(),
        )?;
        let debug = format!("{sender:?}");
        assert!(!debug.contains("re_secret"));
        assert!(debug.contains(RESEND_API_URL));
        Ok(())
    }
}
