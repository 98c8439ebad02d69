use crate::{
    api::{self, email::EmailConfig, handlers::auth::AuthConfig},
    cli::telemetry,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub password_reset_ttl_seconds: i64,
    pub allow_signup: bool,
    pub email_from: String,
    pub admin_email: String,
    pub resend_api_key: Option<SecretString>,
    pub email_queue_capacity: usize,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.frontend_base_url.clone())
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_password_reset_ttl_seconds(self.password_reset_ttl_seconds)
            .with_allow_signup(self.allow_signup)
    }

    fn email_config(&self) -> EmailConfig {
        EmailConfig::new(self.email_from.clone(), self.admin_email.clone())
            .with_resend_api_key(self.resend_api_key.clone())
            .with_queue_capacity(self.email_queue_capacity)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();
    let email_config = args.email_config();

    debug!(
        frontend_base_url = auth_config.frontend_base_url(),
        allow_signup = auth_config.allow_signup(),
        email_queue_capacity = email_config.queue_capacity(),
        "starting server"
    );

    let result = api::new(args.port, args.dsn, auth_config, email_config).await;

    telemetry::shutdown_tracer();

    result
}
