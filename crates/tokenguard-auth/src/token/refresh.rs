//! Refresh token lifecycle and rotation.
//!
//! A refresh token is single-use: each successful [`rotate`](RefreshTokenService::rotate)
//! revokes the presented token and hands back a fresh one for the same
//! identity. Presenting a revoked token again is reported as
//! [`AuthError::TokenRevoked`] so the caller can treat it as a replay.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{RefreshTokenStorage, RotationOutcome, with_timeout};
use crate::types::RefreshToken;

/// A newly created refresh token. The plaintext is not retrievable again.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    /// Secret returned to the client once.
    pub plaintext: String,

    /// Stored record (hash only).
    pub record: RefreshToken,
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct RotatedRefreshToken {
    /// The replacement token.
    pub issued: IssuedRefreshToken,

    /// Identity the rotated chain belongs to.
    pub identity_id: Uuid,
}

/// Creates, revokes and rotates refresh tokens over a [`RefreshTokenStorage`].
#[derive(Clone)]
pub struct RefreshTokenService {
    storage: Arc<dyn RefreshTokenStorage>,
    ttl: Duration,
    timeout: Duration,
}

impl RefreshTokenService {
    /// Creates a service issuing tokens valid for `ttl`, bounding every
    /// storage call by `timeout`.
    #[must_use]
    pub fn new(storage: Arc<dyn RefreshTokenStorage>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            storage,
            ttl,
            timeout,
        }
    }

    /// Lifetime of newly issued tokens.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generates a secret for `identity_id`, stores its hash and returns the
    /// plaintext once.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    pub async fn create_for_identity(
        &self,
        identity_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> AuthResult<IssuedRefreshToken> {
        let issued = new_token(identity_id, expires_at);
        with_timeout(
            self.timeout,
            "refresh_token.create",
            self.storage.create(&issued.record),
        )
        .await?;

        tracing::debug!(
            identity_id = %identity_id,
            token_id = %issued.record.id,
            "refresh token created"
        );
        Ok(issued)
    }

    /// Creates a token for `identity_id` with the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    pub async fn issue(&self, identity_id: Uuid) -> AuthResult<IssuedRefreshToken> {
        self.create_for_identity(identity_id, OffsetDateTime::now_utc() + self.ttl)
            .await
    }

    /// Looks up a record by secret hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        with_timeout(
            self.timeout,
            "refresh_token.find_by_hash",
            self.storage.find_by_hash(token_hash),
        )
        .await
    }

    /// Looks up a record by plaintext secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn find_by_plaintext(&self, plaintext: &str) -> AuthResult<Option<RefreshToken>> {
        self.find_by_hash(&RefreshToken::hash_token(plaintext)).await
    }

    /// Revokes a record. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn revoke(&self, record: &RefreshToken) -> AuthResult<()> {
        with_timeout(
            self.timeout,
            "refresh_token.revoke",
            self.storage.revoke(record.id),
        )
        .await?;

        tracing::debug!(token_id = %record.id, "refresh token revoked");
        Ok(())
    }

    /// Revokes every active token of an identity.
    ///
    /// Nothing in this crate calls this on reuse detection; it exists for
    /// callers that choose to escalate.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn revoke_all_for_identity(&self, identity_id: Uuid) -> AuthResult<u64> {
        let revoked = with_timeout(
            self.timeout,
            "refresh_token.revoke_all_for_identity",
            self.storage.revoke_all_for_identity(identity_id),
        )
        .await?;

        tracing::info!(identity_id = %identity_id, revoked, "refresh token family revoked");
        Ok(revoked)
    }

    /// Exchanges a presented secret for a new one.
    ///
    /// # Errors
    ///
    /// - `TokenNotFound` if no record matches
    /// - `TokenRevoked` if the token was already used or revoked (reuse signal)
    /// - `TokenExpired` if the token has expired
    /// - `TransientStoreError` if storage is unavailable
    pub async fn rotate(&self, incoming: &str) -> AuthResult<RotatedRefreshToken> {
        let current_hash = RefreshToken::hash_token(incoming);
        let now = OffsetDateTime::now_utc();
        let plaintext = RefreshToken::generate_token();
        let replacement_hash = RefreshToken::hash_token(&plaintext);

        let outcome = with_timeout(
            self.timeout,
            "refresh_token.rotate",
            self.storage
                .rotate(&current_hash, &replacement_hash, now + self.ttl, now),
        )
        .await?;

        match outcome {
            RotationOutcome::Rotated {
                previous,
                replacement,
            } => {
                tracing::debug!(
                    identity_id = %previous.identity_id,
                    previous_id = %previous.id,
                    token_id = %replacement.id,
                    "refresh token rotated"
                );
                Ok(RotatedRefreshToken {
                    identity_id: previous.identity_id,
                    issued: IssuedRefreshToken {
                        plaintext,
                        record: replacement,
                    },
                })
            }
            RotationOutcome::NotFound => {
                tracing::debug!(token_hash = %short_hash(&current_hash), "refresh token not found");
                Err(AuthError::TokenNotFound)
            }
            RotationOutcome::Revoked { record } => {
                tracing::warn!(
                    identity_id = %record.identity_id,
                    token_id = %record.id,
                    "revoked refresh token presented; possible token reuse"
                );
                Err(AuthError::TokenRevoked)
            }
            RotationOutcome::Expired { record } => {
                tracing::debug!(token_id = %record.id, "refresh token expired");
                Err(AuthError::TokenExpired)
            }
        }
    }
}

fn new_token(identity_id: Uuid, expires_at: OffsetDateTime) -> IssuedRefreshToken {
    let plaintext = RefreshToken::generate_token();
    let record = RefreshToken::new(identity_id, RefreshToken::hash_token(&plaintext), expires_at);
    IssuedRefreshToken { plaintext, record }
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
