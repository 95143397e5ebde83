//! Authentication primitives for Taskboard.
//!
//! This crate provides:
//! - Signed, time-limited JWTs bound to a user id and a single purpose
//!   (session or password reset)
//! - Salted Argon2id password hashing and verification

mod error;
mod jwt;
mod password;

pub use error::*;
pub use jwt::*;
pub use password::*;

/// Default session token lifetime in hours (7 days).
pub const DEFAULT_JWT_EXPIRATION_HOURS: u64 = 168;

/// Default password reset token lifetime in minutes.
pub const DEFAULT_RESET_TOKEN_MINUTES: u64 = 60;

/// Default JWT issuer.
pub const DEFAULT_JWT_ISSUER: &str = "taskboard";
