//! Credentials
//!
//! Passwords are hashed with Argon2id. Bearer tokens are random and only
//! their SHA-256 digest is persisted.

pub mod password;
pub mod tokens;

pub use password::{generate_password, hash_password, verify_password};
pub use tokens::{generate_token, hash_token};
