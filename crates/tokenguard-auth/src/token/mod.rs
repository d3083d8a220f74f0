//! Token issuance, validation and revocation.
//!
//! This module provides:
//!
//! - Signed access tokens (HS256 JWT)
//! - Hashed, single-use refresh tokens with atomic rotation
//! - An access token denylist in the shared cache

pub mod denylist;
pub mod jwt;
pub mod refresh;

pub use denylist::{DenylistEntry, DenylistService};
pub use jwt::{AccessTokenClaims, IssuedAccessToken, JwtError, JwtService};
pub use refresh::{IssuedRefreshToken, RefreshTokenService, RotatedRefreshToken};
