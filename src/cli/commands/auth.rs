use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use url::Url;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_PASSWORD_RESET_TTL_SECONDS: &str = "password-reset-ttl-seconds";
pub const ARG_ALLOW_SIGNUP: &str = "allow-signup";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for CORS and password links")
                .env("GATEHOUSE_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("GATEHOUSE_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_RESET_TTL_SECONDS)
                .long(ARG_PASSWORD_RESET_TTL_SECONDS)
                .help("Password reset and invite link TTL in seconds")
                .env("GATEHOUSE_PASSWORD_RESET_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_ALLOW_SIGNUP)
                .long(ARG_ALLOW_SIGNUP)
                .help("Allow direct sign-up without an approved access request")
                .env("GATEHOUSE_ALLOW_SIGNUP")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub password_reset_ttl_seconds: i64,
    pub allow_signup: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if the frontend URL is not an absolute http(s) URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;
        let parsed = Url::parse(&frontend_base_url)
            .with_context(|| format!("invalid --frontend-base-url: {frontend_base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "--frontend-base-url must use http or https: {frontend_base_url}"
            ));
        }

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
            password_reset_ttl_seconds: matches
                .get_one::<i64>(ARG_PASSWORD_RESET_TTL_SECONDS)
                .copied()
                .unwrap_or(3_600),
            allow_signup: matches.get_flag(ARG_ALLOW_SIGNUP),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        let matches = with_args(Command::new("test")).try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn defaults() -> Result<()> {
        temp_env::with_vars(
            [
                ("GATEHOUSE_FRONTEND_BASE_URL", None::<&str>),
                ("GATEHOUSE_ALLOW_SIGNUP", None),
                ("GATEHOUSE_SESSION_TTL_SECONDS", None),
                ("GATEHOUSE_PASSWORD_RESET_TTL_SECONDS", None),
            ],
            || {
                let options = parse(&["test"])?;
                assert_eq!(options.frontend_base_url, "http://localhost:3000");
                assert_eq!(options.session_ttl_seconds, 604_800);
                assert_eq!(options.password_reset_ttl_seconds, 3_600);
                assert!(!options.allow_signup);
                Ok(())
            },
        )
    }

    #[test]
    fn env_enables_signup() -> Result<()> {
        temp_env::with_vars(
            [
                ("GATEHOUSE_ALLOW_SIGNUP", Some("true")),
                ("GATEHOUSE_FRONTEND_BASE_URL", Some("https://app.example.com")),
            ],
            || {
                let options = parse(&["test"])?;
                assert!(options.allow_signup);
                assert_eq!(options.frontend_base_url, "https://app.example.com");
                Ok(())
            },
        )
    }

    #[test]
    fn rejects_non_http_frontend() {
        temp_env::with_var_unset("GATEHOUSE_FRONTEND_BASE_URL", || {
            assert!(parse(&["test", "--frontend-base-url", "ftp://example.com"]).is_err());
            assert!(parse(&["test", "--frontend-base-url", "example.com"]).is_err());
        });
    }

    #[test]
    fn rejects_tiny_ttl() {
        temp_env::with_var_unset("GATEHOUSE_SESSION_TTL_SECONDS", || {
            assert!(parse(&["test", "--session-ttl-seconds", "5"]).is_err());
        });
    }
}
