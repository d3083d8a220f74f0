//! Credential storage.
//!
//! Username and email are unique case-insensitively through expression
//! indexes on `LOWER(...)`.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tokenguard_auth::types::Credential;
use tracing::instrument;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

type CredentialTuple = (
    Uuid,
    String,
    String,
    String,
    bool,
    bool,
    i32,
    Option<OffsetDateTime>,
    Vec<String>,
    OffsetDateTime,
    OffsetDateTime,
);

const SELECT_COLUMNS: &str = "id, username, email, password_hash, enabled, email_verified, \
     failed_attempts, locked_until, roles, created_at, updated_at";

fn from_tuple(row: CredentialTuple) -> Credential {
    Credential {
        id: row.0,
        username: row.1,
        email: row.2,
        password_hash: row.3,
        enabled: row.4,
        email_verified: row.5,
        failed_attempts: u32::try_from(row.6).unwrap_or(0),
        locked_until: row.7,
        roles: row.8,
        created_at: row.9,
        updated_at: row.10,
    }
}

/// Credential storage operations.
pub struct CredentialStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> CredentialStorage<'a> {
    /// Create a new credential storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a credential by identity id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<Credential>> {
        let sql = format!("SELECT {} FROM credentials WHERE id = $1", SELECT_COLUMNS);
        let row: Option<CredentialTuple> = query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(from_tuple))
    }

    /// Find a credential by username or email, case-insensitively.
    ///
    /// A username match wins over an email match.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    #[instrument(skip(self))]
    pub async fn find_by_login(&self, login: &str) -> StorageResult<Option<Credential>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM credentials
            WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1)
            ORDER BY (LOWER(username) = LOWER($1)) DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );
        let row: Option<CredentialTuple> = query_as(&sql)
            .bind(login)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(from_tuple))
    }

    /// Insert a credential, or update every mutable column if the id exists.
    ///
    /// `created_at` is kept from the first insert.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the username or email is taken by another
    /// identity, or a database error.
    #[instrument(skip(self, credential), fields(identity_id = %credential.id))]
    pub async fn save(&self, credential: &Credential) -> StorageResult<()> {
        let failed_attempts = i32::try_from(credential.failed_attempts).map_err(|_| {
            StorageError::invalid_input(format!(
                "failed_attempts out of range: {}",
                credential.failed_attempts
            ))
        })?;

        query(
            r#"
            INSERT INTO credentials (
                id, username, email, password_hash, enabled, email_verified,
                failed_attempts, locked_until, roles, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                enabled = EXCLUDED.enabled,
                email_verified = EXCLUDED.email_verified,
                failed_attempts = EXCLUDED.failed_attempts,
                locked_until = EXCLUDED.locked_until,
                roles = EXCLUDED.roles,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(credential.id)
        .bind(&credential.username)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(credential.enabled)
        .bind(credential.email_verified)
        .bind(failed_attempts)
        .bind(credential.locked_until)
        .bind(&credential.roles)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(self.pool)
        .await
        .map_err(|e| StorageError::from_write(e, "username or email"))?;

        Ok(())
    }
}
