//! Refresh token domain type.
//!
//! # Security
//!
//! - Only a SHA-256 hash of the secret is persisted
//! - The revoked flag only ever goes from `false` to `true`
//! - Expiry is detected lazily at use time; nothing sweeps expired rows

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Number of random bytes in a refresh token secret (512 bits).
pub const TOKEN_BYTES: usize = 64;

/// Lifecycle state of a refresh token at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenStatus {
    /// Usable for exactly one rotation.
    Active,
    /// Revoked by rotation or logout. Presenting it again is a reuse signal.
    Revoked,
    /// Past its expiry.
    Expired,
}

/// Refresh token record.
///
/// When validating a presented token:
///
/// 1. Hash the incoming secret
/// 2. Look up by hash
/// 3. Check revocation, then expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Opaque record id.
    pub id: Uuid,

    /// Identity this token was issued to.
    pub identity_id: Uuid,

    /// SHA-256 hex digest of the secret.
    pub token_hash: String,

    /// Set once, never cleared.
    pub revoked: bool,

    /// When this token stops being usable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RefreshToken {
    /// Creates an active record for an already-hashed secret.
    #[must_use]
    pub fn new(identity_id: Uuid, token_hash: String, expires_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id,
            token_hash,
            revoked: false,
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if this token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if this token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Returns the token's state at `now`. Revocation wins over expiry.
    #[must_use]
    pub fn status_at(&self, now: OffsetDateTime) -> RefreshTokenStatus {
        if self.revoked {
            RefreshTokenStatus::Revoked
        } else if self.is_expired_at(now) {
            RefreshTokenStatus::Expired
        } else {
            RefreshTokenStatus::Active
        }
    }

    /// Returns `true` if this token is neither revoked nor expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status_at(OffsetDateTime::now_utc()) == RefreshTokenStatus::Active
    }

    /// Hash a token secret using SHA-256 (lowercase hex).
    ///
    /// Used both when storing new tokens and when looking them up.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a cryptographically secure random token secret.
    ///
    /// Returns a 512-bit random value encoded as base64url (86 characters).
    #[must_use]
    pub fn generate_token() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; TOKEN_BYTES];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes[..]);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
