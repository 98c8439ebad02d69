//! Route handlers for access requests, accounts and health.

pub mod access_requests;
pub mod auth;
pub mod health;
pub(crate) mod validation;

#[cfg(test)]
pub(crate) mod test_support;
