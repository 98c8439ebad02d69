use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::{email::DEFAULT_QUEUE_CAPACITY, handlers::validation::valid_email};

pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_ADMIN_EMAIL: &str = "admin-email";
pub const ARG_RESEND_API_KEY: &str = "resend-api-key";
pub const ARG_EMAIL_QUEUE_CAPACITY: &str = "email-queue-capacity";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address for outbound email")
                .env("GATEHOUSE_EMAIL_FROM")
                .default_value("Gatehouse <noreply@gatehouse.dev>"),
        )
        .arg(
            Arg::new(ARG_ADMIN_EMAIL)
                .long(ARG_ADMIN_EMAIL)
                .help("Address notified about new access requests")
                .env("GATEHOUSE_ADMIN_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_RESEND_API_KEY)
                .long(ARG_RESEND_API_KEY)
                .help("Resend API key; without it email is only logged")
                .env("GATEHOUSE_RESEND_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_QUEUE_CAPACITY)
                .long(ARG_EMAIL_QUEUE_CAPACITY)
                .help("Outbound email queue capacity; extra messages are dropped")
                .env("GATEHOUSE_EMAIL_QUEUE_CAPACITY")
                .default_value("100")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub from: String,
    pub admin_email: String,
    pub resend_api_key: Option<SecretString>,
    pub queue_capacity: usize,
}

impl Options {
    /// # Errors
    /// Returns an error if the admin address is missing or malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let admin_email = matches
            .get_one::<String>(ARG_ADMIN_EMAIL)
            .map(|email| email.trim().to_lowercase())
            .context("missing required argument: --admin-email")?;
        if !valid_email(&admin_email) {
            return Err(anyhow!("invalid --admin-email: {admin_email}"));
        }

        Ok(Self {
            from: matches
                .get_one::<String>(ARG_EMAIL_FROM)
                .cloned()
                .context("missing required argument: --email-from")?,
            admin_email,
            resend_api_key: matches
                .get_one::<String>(ARG_RESEND_API_KEY)
                .filter(|key| !key.trim().is_empty())
                .map(|key| SecretString::from(key.clone())),
            queue_capacity: matches
                .get_one::<usize>(ARG_EMAIL_QUEUE_CAPACITY)
                .copied()
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
        })
    }
}
