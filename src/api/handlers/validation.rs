//! Field rules shared by access requests and sign-up.
//!
//! Each check returns the caller-facing message of the first failure.
//! Lengths are counted in characters, not bytes.

use regex::Regex;
use std::sync::LazyLock;

pub(crate) const USERNAME_MIN_LENGTH: usize = 3;
pub(crate) const USERNAME_MAX_LENGTH: usize = 30;
pub(crate) const REASON_MIN_LENGTH: usize = 20;

pub(crate) const MISSING_FIELDS: &str = "Missing required fields";
pub(crate) const USERNAME_LENGTH: &str = "Username must be between 3 and 30 characters";
pub(crate) const USERNAME_PATTERN: &str =
    "Username can only contain letters, numbers, dots, and underscores";
pub(crate) const INVALID_EMAIL: &str = "Invalid email address";
pub(crate) const REASON_LENGTH: &str = "Reason must be at least 20 characters";

static USERNAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._]+$").ok());
static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Lookup/uniqueness form of a username or email.
pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub(crate) fn validate_username(username: &str) -> Result<(), &'static str> {
    let length = username.chars().count();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&length) {
        return Err(USERNAME_LENGTH);
    }
    if !USERNAME_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(username))
    {
        return Err(USERNAME_PATTERN);
    }
    Ok(())
}

pub(crate) fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|regex| regex.is_match(email))
}

pub(crate) fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.chars().count() < REASON_MIN_LENGTH {
        return Err(REASON_LENGTH);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_bounds() {
        assert_eq!(validate_username("ab"), Err(USERNAME_LENGTH));
        assert_eq!(validate_username("abc"), Ok(()));
        assert_eq!(validate_username(&"a".repeat(30)), Ok(()));
        assert_eq!(validate_username(&"a".repeat(31)), Err(USERNAME_LENGTH));
    }

    #[test]
    fn username_pattern_allows_dots_and_underscores() {
        assert_eq!(validate_username("jane.doe_42"), Ok(()));
        assert_eq!(validate_username("jane-doe"), Err(USERNAME_PATTERN));
        assert_eq!(validate_username("jane doe"), Err(USERNAME_PATTERN));
        assert_eq!(validate_username("jöhn"), Err(USERNAME_PATTERN));
    }

    #[test]
    fn username_length_counts_characters() {
        // Four characters, eight bytes: fails the pattern, not the length.
        assert_eq!(validate_username("éééé"), Err(USERNAME_PATTERN));
        assert_eq!(validate_username("éé"), Err(USERNAME_LENGTH));
    }

    #[test]
    fn email_shape() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("first.last@sub.example.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("no-at.example.com"));
        assert!(!valid_email("a b@example.com"));
        assert!(!valid_email("a@@example.com"));
    }

    #[test]
    fn reason_boundary() {
        assert_eq!(validate_reason(&"x".repeat(19)), Err(REASON_LENGTH));
        assert_eq!(validate_reason(&"x".repeat(20)), Ok(()));
        assert_eq!(validate_reason(&"é".repeat(20)), Ok(()));
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Jane.Doe@Example.COM "), "jane.doe@example.com");
        assert!(is_blank("   "));
        assert!(!is_blank(" a "));
    }
}
