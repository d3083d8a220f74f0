//! Arc-owning storage adapters.
//!
//! These wrap the lifetime-based storage types and own an `Arc<PgPool>`, so
//! they can be handed to `SessionService` as `Arc<dyn ...>`. Every call is
//! bounded by the configured database timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokenguard_auth::storage::{
    CredentialStorage as CredentialStorageTrait, RefreshTokenStorage as RefreshTokenStorageTrait,
    RotationOutcome, with_timeout,
};
use tokenguard_auth::types::{Credential, RefreshToken};
use tokenguard_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::PgPool;
use crate::credential::CredentialStorage;
use crate::refresh_token::TokenStorage;

// =============================================================================
// Arc-Owning Credential Storage
// =============================================================================

/// Arc-owning PostgreSQL credential storage adapter.
#[derive(Clone)]
pub struct ArcCredentialStorage {
    pool: Arc<PgPool>,
    timeout: Duration,
}

impl ArcCredentialStorage {
    /// Create a new Arc-owning credential storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl CredentialStorageTrait for ArcCredentialStorage {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>> {
        let storage = CredentialStorage::new(&self.pool);
        with_timeout(self.timeout, "credentials.find_by_id", async {
            storage.find_by_id(id).await.map_err(AuthError::from)
        })
        .await
    }

    async fn find_by_login(&self, login: &str) -> AuthResult<Option<Credential>> {
        let storage = CredentialStorage::new(&self.pool);
        with_timeout(self.timeout, "credentials.find_by_login", async {
            storage.find_by_login(login).await.map_err(AuthError::from)
        })
        .await
    }

    async fn save(&self, credential: &Credential) -> AuthResult<()> {
        let storage = CredentialStorage::new(&self.pool);
        with_timeout(self.timeout, "credentials.save", async {
            storage.save(credential).await.map_err(AuthError::from)
        })
        .await
    }
}

// =============================================================================
// Arc-Owning Refresh Token Storage
// =============================================================================

/// Arc-owning PostgreSQL refresh token storage adapter.
#[derive(Clone)]
pub struct ArcRefreshTokenStorage {
    pool: Arc<PgPool>,
    timeout: Duration,
}

impl ArcRefreshTokenStorage {
    /// Create a new Arc-owning refresh token storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl RefreshTokenStorageTrait for ArcRefreshTokenStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        let storage = TokenStorage::new(&self.pool);
        with_timeout(self.timeout, "refresh_tokens.create", async {
            storage.create(token).await.map_err(AuthError::from)
        })
        .await
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        let storage = TokenStorage::new(&self.pool);
        with_timeout(self.timeout, "refresh_tokens.find_by_hash", async {
            storage.find_by_hash(token_hash).await.map_err(AuthError::from)
        })
        .await
    }

    async fn revoke(&self, id: Uuid) -> AuthResult<()> {
        let storage = TokenStorage::new(&self.pool);
        with_timeout(self.timeout, "refresh_tokens.revoke", async {
            storage.revoke(id).await.map_err(AuthError::from)
        })
        .await
    }

    async fn rotate(
        &self,
        current_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        let storage = TokenStorage::new(&self.pool);
        with_timeout(self.timeout, "refresh_tokens.rotate", async {
            storage
                .rotate(current_hash, replacement_hash, replacement_expires_at, now)
                .await
                .map_err(AuthError::from)
        })
        .await
    }

    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> AuthResult<u64> {
        let storage = TokenStorage::new(&self.pool);
        with_timeout(self.timeout, "refresh_tokens.revoke_all_for_identity", async {
            storage
                .revoke_all_for_identity(identity_id)
                .await
                .map_err(AuthError::from)
        })
        .await
    }
}
