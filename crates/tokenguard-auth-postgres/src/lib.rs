//! PostgreSQL storage backend for tokenguard-auth
//!
//! Provides persistent storage for:
//!
//! - Credentials (`credentials` table)
//! - Refresh tokens (`refresh_tokens` table), stored as SHA-256 hashes
//!
//! Tables are created by the embedded migrations in [`migrations`].
//!
//! # Example
//!
//! ```ignore
//! use tokenguard_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::from_config(&config.database).await?;
//! storage.migrate().await?;
//!
//! let sessions = SessionService::new(
//!     &config,
//!     storage.credential_storage(),
//!     storage.refresh_token_storage(),
//!     cache,
//! );
//! ```

pub mod credential;
pub mod migrations;
pub mod refresh_token;
pub mod storage_adapters;

use std::sync::Arc;
use std::time::Duration;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;
use tokenguard_auth::AuthError;
use tokenguard_auth::config::DatabaseConfig;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use credential::CredentialStorage;
pub use refresh_token::TokenStorage;
pub use storage_adapters::{ArcCredentialStorage, ArcRefreshTokenStorage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Applying migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx_core::migrate::MigrateError),

    /// Unique constraint violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if the failure is in reaching the database rather than
    /// in the statement itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
                    | sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }

    /// Maps a unique violation to `Conflict`, leaving other errors as they are.
    pub(crate) fn from_write(e: sqlx_core::Error, what: &str) -> Self {
        if let sqlx_core::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::conflict(format!("{} already exists", what));
        }
        Self::Database(e)
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            AuthError::transient(e.to_string())
        } else {
            AuthError::internal(e.to_string())
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Main Storage Type
// =============================================================================

/// PostgreSQL auth storage.
///
/// Owns the connection pool and hands out Arc-owning trait adapters.
#[derive(Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
    timeout: Duration,
}

impl PostgresAuthStorage {
    /// Default bound on a single storage operation.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a new PostgreSQL auth storage from an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a new PostgreSQL auth storage by connecting to a database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Connects using the `database` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if no URL is configured, or a database error if
    /// the connection fails.
    pub async fn from_config(config: &DatabaseConfig) -> StorageResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StorageError::invalid_input("database.url is not set"))?;

        let pool = PoolOptions::<Postgres>::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.timeout)
            .connect(url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL auth storage"
        );
        Ok(Self::new(pool).with_timeout(config.timeout))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Per-operation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Credential storage operations.
    #[must_use]
    pub fn credentials(&self) -> CredentialStorage<'_> {
        CredentialStorage::new(&self.pool)
    }

    /// Refresh token storage operations.
    #[must_use]
    pub fn tokens(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }

    /// Credential storage as a trait object for `SessionService`.
    #[must_use]
    pub fn credential_storage(&self) -> Arc<ArcCredentialStorage> {
        Arc::new(ArcCredentialStorage::new(
            Arc::clone(&self.pool),
            self.timeout,
        ))
    }

    /// Refresh token storage as a trait object for `SessionService`.
    #[must_use]
    pub fn refresh_token_storage(&self) -> Arc<ArcRefreshTokenStorage> {
        Arc::new(ArcRefreshTokenStorage::new(
            Arc::clone(&self.pool),
            self.timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        let err = StorageError::Database(sqlx_core::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(matches!(
            AuthError::from(err),
            AuthError::TransientStoreError { .. }
        ));
    }

    #[test]
    fn test_statement_errors_are_internal() {
        let err = StorageError::Database(sqlx_core::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(matches!(AuthError::from(err), AuthError::Internal { .. }));

        let err = StorageError::conflict("credential");
        assert!(err.is_conflict());
        assert!(matches!(AuthError::from(err), AuthError::Internal { .. }));
    }
}
