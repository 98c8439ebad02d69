//! Maps validated CLI arguments to the server action.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{auth, email, ARG_DSN, ARG_PORT},
};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        password_reset_ttl_seconds: auth_opts.password_reset_ttl_seconds,
        allow_signup: auth_opts.allow_signup,
        email_from: email_opts.from,
        admin_email: email_opts.admin_email,
        resend_api_key: email_opts.resend_api_key,
        email_queue_capacity: email_opts.queue_capacity,
    }))
}
