//! # tokenguard-auth
//!
//! Credential and session-security core for a stateless, horizontally scaled
//! authentication service.
//!
//! This crate provides:
//! - Signed access tokens (HS256) with strict verification
//! - Hashed, single-use refresh tokens with atomic rotation and reuse detection
//! - An access token denylist in a shared cache
//! - Account lockout after repeated failed logins
//! - A fixed-window rate limiter for authentication endpoints
//!
//! ## Overview
//!
//! All cross-request state lives behind two seams: [`storage::CredentialStorage`]
//! / [`storage::RefreshTokenStorage`] for the relational store, and
//! [`storage::SharedCache`] for the denylist and rate limit counters. Backends
//! are injected at startup; in-memory ones ship here, PostgreSQL and Redis
//! ones in `tokenguard-auth-postgres` and `tokenguard-auth-redis`.
//!
//! ## Modules
//!
//! - [`config`] - Configuration and loading
//! - [`token`] - Access token codec, refresh token rotation, denylist
//! - [`lockout`] - Account lockout policy
//! - [`rate_limit`] - Rate limiter and rule table
//! - [`session`] - Login, refresh, logout and request authentication flows
//! - [`password`] - Argon2 password hashing
//! - [`storage`] - Storage and cache traits, in-memory storage
//! - [`cache`] - In-process shared cache
//! - [`middleware`] - Axum extractor, rate limit middleware, error responses

pub mod cache;
pub mod config;
pub mod error;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use cache::LocalCache;
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use lockout::{FailureOutcome, LockoutPolicy};
pub use middleware::{BearerAuth, RateLimitState, rate_limit_middleware};
pub use rate_limit::{RateLimitRules, RateLimiter};
pub use session::{SessionService, TokenPair};
pub use storage::{
    CredentialStorage, MemoryAuthStorage, RefreshTokenStorage, RotationOutcome, SharedCache,
};
pub use token::{
    AccessTokenClaims, DenylistService, JwtError, JwtService, RefreshTokenService,
};
pub use types::{Credential, Identity, RefreshToken, RefreshTokenStatus};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokenguard_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::lockout::LockoutPolicy;
    pub use crate::middleware::{BearerAuth, RateLimitState, rate_limit_middleware};
    pub use crate::rate_limit::RateLimiter;
    pub use crate::session::{SessionService, TokenPair};
    pub use crate::storage::{CredentialStorage, RefreshTokenStorage, SharedCache};
    pub use crate::token::{AccessTokenClaims, JwtService};
    pub use crate::types::{Credential, Identity, RefreshToken};
}
