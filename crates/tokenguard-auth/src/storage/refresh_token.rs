//! Refresh token storage trait.
//!
//! # Security Considerations
//!
//! - Tokens are stored as SHA-256 hashes only
//! - Revocation is idempotent and never undone
//! - Rotation revokes the presented token and stores its replacement as one
//!   atomic unit

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::RefreshToken;

/// Result of an atomic rotation attempt.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The presented token was active; it is now revoked and the
    /// replacement is stored.
    Rotated {
        /// The presented record as it was before revocation.
        previous: RefreshToken,
        /// The stored replacement, owned by the same identity.
        replacement: RefreshToken,
    },
    /// No record matches the presented hash.
    NotFound,
    /// The presented token was already revoked. Reuse signal.
    Revoked {
        /// The revoked record.
        record: RefreshToken,
    },
    /// The presented token has expired.
    Expired {
        /// The expired record.
        record: RefreshToken,
    },
}

/// Storage trait for refresh tokens.
///
/// Implementations must guarantee that concurrent
/// [`rotate`](Self::rotate) calls for the same hash have exactly one
/// `Rotated` winner; every other caller observes `Revoked`.
///
/// # Implementations
///
/// - [`MemoryAuthStorage`](crate::storage::MemoryAuthStorage)
/// - `tokenguard-auth-postgres` - row lock inside a transaction
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored (e.g., duplicate hash,
    /// storage unavailable).
    async fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by its hash, regardless of state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Marks a token revoked. Revoking an already revoked or unknown token
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, id: Uuid) -> AuthResult<()>;

    /// Atomically revokes the active token with `current_hash` and stores a
    /// replacement with `replacement_hash` for the same identity.
    ///
    /// The presented token's state is judged at `now`: revoked before
    /// expired. Nothing is written unless the outcome is `Rotated`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails; no partial rotation
    /// is left behind.
    async fn rotate(
        &self,
        current_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome>;

    /// Revokes every active token of an identity, returning how many were
    /// revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> AuthResult<u64>;
}
