//! Authentication and authorization for Wicket
//!
//! Provides:
//! - HS256 token signing and verification with separate access/refresh keys
//! - Session lifecycle (login, refresh rotation, logout) over token versions
//! - Role-based permission resolution
//! - Password hashing with Argon2

pub mod lifetime;
pub mod password;
pub mod permissions;
pub mod session;
pub mod token;

pub use lifetime::{Lifetime, LifetimePolicy};
pub use password::{hash_password, verify_password, Argon2Hasher, CredentialHasher};
pub use permissions::PermissionResolver;
pub use session::{Authenticated, LoginOutcome, RefreshOutcome, SessionManager, TokenPair};
pub use token::{
    extract_token_from_header, extract_token_from_query, AccessClaims, RefreshClaims, Signed,
    TokenCodec, TokenError, TokenKeys,
};
