//! Refresh token storage.
//!
//! Only SHA-256 hashes of refresh token secrets reach the database.
//! Rotation locks the presented row with `SELECT ... FOR UPDATE` so that
//! concurrent rotations of the same token serialize on it: the first commits,
//! the rest re-read the row as revoked.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tokenguard_auth::storage::RotationOutcome;
use tokenguard_auth::types::{RefreshToken, RefreshTokenStatus};
use tracing::instrument;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

type TokenTuple = (Uuid, Uuid, String, bool, OffsetDateTime, OffsetDateTime);

fn from_tuple(row: TokenTuple) -> RefreshToken {
    RefreshToken {
        id: row.0,
        identity_id: row.1,
        token_hash: row.2,
        revoked: row.3,
        expires_at: row.4,
        created_at: row.5,
    }
}

/// Refresh token storage operations.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a new refresh token.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the hash already exists, or a database error.
    #[instrument(skip(self, token), fields(token_id = %token.id, identity_id = %token.identity_id))]
    pub async fn create(&self, token: &RefreshToken) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO refresh_tokens (id, identity_id, token_hash, revoked, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.identity_id)
        .bind(&token.token_hash)
        .bind(token.revoked)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(self.pool)
        .await
        .map_err(|e| StorageError::from_write(e, "refresh token"))?;

        Ok(())
    }

    /// Find a token by its hash, regardless of state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    #[instrument(skip(self))]
    pub async fn find_by_hash(&self, token_hash: &str) -> StorageResult<Option<RefreshToken>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT id, identity_id, token_hash, revoked, expires_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_tuple))
    }

    /// Mark a token revoked. Unknown or already revoked tokens are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    #[instrument(skip(self))]
    pub async fn revoke(&self, id: Uuid) -> StorageResult<()> {
        query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1 AND revoked = FALSE")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Revoke every active token of an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    #[instrument(skip(self))]
    pub async fn revoke_all_for_identity(&self, identity_id: Uuid) -> StorageResult<u64> {
        let result = query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE identity_id = $1 AND revoked = FALSE",
        )
        .bind(identity_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Revoke the token with `current_hash` and insert its replacement in one
    /// transaction.
    ///
    /// Nothing is written unless the presented token is active at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; it is rolled back.
    #[instrument(skip(self, replacement_hash))]
    pub async fn rotate(
        &self,
        current_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> StorageResult<RotationOutcome> {
        let mut tx = self.pool.begin().await?;

        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT id, identity_id, token_hash, revoked, expires_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            FOR UPDATE
            "#,
        )
        .bind(current_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(previous) = row.map(from_tuple) else {
            return Ok(RotationOutcome::NotFound);
        };

        match previous.status_at(now) {
            RefreshTokenStatus::Revoked => return Ok(RotationOutcome::Revoked { record: previous }),
            RefreshTokenStatus::Expired => return Ok(RotationOutcome::Expired { record: previous }),
            RefreshTokenStatus::Active => {}
        }

        query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(previous.id)
            .execute(&mut *tx)
            .await?;

        let replacement = RefreshToken::new(
            previous.identity_id,
            replacement_hash.to_string(),
            replacement_expires_at,
        );
        query(
            r#"
            INSERT INTO refresh_tokens (id, identity_id, token_hash, revoked, expires_at, created_at)
            VALUES ($1, $2, $3, FALSE, $4, $5)
            "#,
        )
        .bind(replacement.id)
        .bind(replacement.identity_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::from_write(e, "refresh token"))?;

        tx.commit().await?;

        Ok(RotationOutcome::Rotated {
            previous,
            replacement,
        })
    }
}
