//! Credential storage trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::Credential;

/// Storage trait for credential records.
///
/// Records are never deleted through this interface. Lockout state is written
/// back with [`save`](Self::save) after each login decision; a lost update
/// between concurrent logins for the same identity is tolerated.
#[async_trait]
pub trait CredentialStorage: Send + Sync {
    /// Finds a credential by identity id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>>;

    /// Finds a credential by username or email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_login(&self, login: &str) -> AuthResult<Option<Credential>>;

    /// Inserts or updates a credential record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored (e.g., duplicate
    /// username or email, storage unavailable).
    async fn save(&self, credential: &Credential) -> AuthResult<()>;
}
