//! Auth handlers and supporting modules.
//!
//! Sessions are opaque random tokens delivered in the `gatehouse_session`
//! cookie or as a bearer token. Only their SHA-256 hash is stored.
//! Passwords are Argon2id PHC strings on the user's `credential` account.
//!
//! ## Invites
//!
//! Approved access requests get a credential account without a password.
//! The approval handler then issues a password-reset token in invite mode,
//! and the user picks their first password through the reset link. Until
//! then sign-in fails with the same 401 as a wrong password.

pub(crate) mod password;
pub(crate) mod principal;
pub(crate) mod session;
pub(crate) mod signin;
pub(crate) mod signup;
mod state;
pub(crate) mod types;
pub(crate) mod utils;

pub use state::AuthConfig;
