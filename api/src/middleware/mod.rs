//! HTTP middleware

pub mod auth;
pub mod permissions;
pub mod rate_limit;

pub use auth::TokenVerifier;
pub use permissions::{govern, with_member_policy, with_policy, Caller};
