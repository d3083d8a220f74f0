//! Domain types shared by the token, storage and session modules.
//!
//! - [`Credential`] - durable login record with lockout state
//! - [`Identity`] - the subject an access token is issued for
//! - [`RefreshToken`] - hashed, rotatable refresh token record

pub mod credential;
pub mod refresh_token;

pub use credential::{Credential, Identity};
pub use refresh_token::{RefreshToken, RefreshTokenStatus};
