//! # Gatehouse
//!
//! `gatehouse` is the server side of an invite-gated web application. Visitors
//! cannot sign up on their own; they submit an access request with a short
//! justification, and an administrator approves or rejects it.
//!
//! ## Access requests
//!
//! - **Uniqueness:** usernames and emails are lowercased and unique across
//!   all requests, whatever their status.
//! - **Single review:** a request leaves `pending` exactly once. A second
//!   review gets `400 This request has already been reviewed`.
//! - **Approval:** creates the user, a credential account without a password
//!   and the status change in one transaction, then emails a set-password
//!   link.
//!
//! ## Accounts
//!
//! Sessions are opaque tokens in the `gatehouse_session` cookie (or a bearer
//! header); only their SHA-256 hash is stored. Passwords are Argon2id. The
//! admin role is read from the user row on every admin request.
//!
//! ## Email
//!
//! Outbound email goes through a bounded in-process queue. Handlers never wait
//! for delivery and never fail because of it.

pub mod api;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
