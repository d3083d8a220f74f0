//! In-memory credential and refresh token storage.
//!
//! Every operation completes under a single lock, which makes rotation
//! trivially atomic. Used by tests and single-instance setups.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{CredentialStorage, RefreshTokenStorage, RotationOutcome};
use crate::types::{Credential, RefreshToken, RefreshTokenStatus};

/// In-memory storage for credentials and refresh tokens.
#[derive(Default)]
pub struct MemoryAuthStorage {
    credentials: RwLock<HashMap<Uuid, Credential>>,
    // keyed by token hash
    refresh_tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl MemoryAuthStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored refresh token records, any state.
    #[must_use]
    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.lock().len()
    }

    /// Active refresh tokens of an identity at `now`.
    #[must_use]
    pub fn active_tokens_for(&self, identity_id: Uuid, now: OffsetDateTime) -> Vec<RefreshToken> {
        self.refresh_tokens
            .lock()
            .values()
            .filter(|t| {
                t.identity_id == identity_id && t.status_at(now) == RefreshTokenStatus::Active
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CredentialStorage for MemoryAuthStorage {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>> {
        Ok(self.credentials.read().get(&id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> AuthResult<Option<Credential>> {
        let credentials = self.credentials.read();
        let found = credentials
            .values()
            .find(|c| c.username.eq_ignore_ascii_case(login))
            .or_else(|| {
                credentials
                    .values()
                    .find(|c| c.email.eq_ignore_ascii_case(login))
            });
        Ok(found.cloned())
    }

    async fn save(&self, credential: &Credential) -> AuthResult<()> {
        let mut credentials = self.credentials.write();

        let conflict = credentials.values().any(|existing| {
            existing.id != credential.id
                && (existing.username.eq_ignore_ascii_case(&credential.username)
                    || existing.email.eq_ignore_ascii_case(&credential.email))
        });
        if conflict {
            return Err(AuthError::internal(format!(
                "username or email already in use: {}",
                credential.username
            )));
        }

        let mut stored = credential.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        credentials.insert(stored.id, stored);
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryAuthStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        let mut tokens = self.refresh_tokens.lock();
        if tokens.contains_key(&token.token_hash) {
            return Err(AuthError::internal("duplicate refresh token hash"));
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.lock().get(token_hash).cloned())
    }

    async fn revoke(&self, id: Uuid) -> AuthResult<()> {
        if let Some(token) = self
            .refresh_tokens
            .lock()
            .values_mut()
            .find(|t| t.id == id)
        {
            token.revoked = true;
        }
        Ok(())
    }

    async fn rotate(
        &self,
        current_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        let mut tokens = self.refresh_tokens.lock();

        let previous = match tokens.get(current_hash) {
            None => return Ok(RotationOutcome::NotFound),
            Some(current) => match current.status_at(now) {
                RefreshTokenStatus::Revoked => {
                    return Ok(RotationOutcome::Revoked {
                        record: current.clone(),
                    });
                }
                RefreshTokenStatus::Expired => {
                    return Ok(RotationOutcome::Expired {
                        record: current.clone(),
                    });
                }
                RefreshTokenStatus::Active => current.clone(),
            },
        };

        if tokens.contains_key(replacement_hash) {
            return Err(AuthError::internal("duplicate refresh token hash"));
        }
        if let Some(current) = tokens.get_mut(current_hash) {
            current.revoked = true;
        }

        let replacement = RefreshToken::new(
            previous.identity_id,
            replacement_hash.to_string(),
            replacement_expires_at,
        );
        tokens.insert(replacement.token_hash.clone(), replacement.clone());

        Ok(RotationOutcome::Rotated {
            previous,
            replacement,
        })
    }

    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> AuthResult<u64> {
        let mut revoked = 0;
        for token in self
            .refresh_tokens
            .lock()
            .values_mut()
            .filter(|t| t.identity_id == identity_id && !t.revoked)
        {
            token.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token_for(identity_id: Uuid, secret: &str, expires_in: Duration) -> RefreshToken {
        RefreshToken::new(
            identity_id,
            RefreshToken::hash_token(secret),
            OffsetDateTime::now_utc() + expires_in,
        )
    }

    #[tokio::test]
    async fn test_credential_lookup_by_login() {
        let storage = MemoryAuthStorage::new();
        let cred = Credential::new("Alice", "alice@example.com", "hash", vec![]);
        storage.save(&cred).await.unwrap();

        let by_name = storage.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, cred.id);
        let by_email = storage.find_by_login("ALICE@example.com").await.unwrap();
        assert!(by_email.is_some());
        assert!(storage.find_by_login("bob").await.unwrap().is_none());
        assert!(storage.find_by_id(cred.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_username_match_wins_over_email_match() {
        let storage = MemoryAuthStorage::new();
        let by_email = Credential::new("bob", "shared@example.com", "h", vec![]);
        let by_name = Credential::new("Shared@example.com", "carol@example.com", "h", vec![]);
        storage.save(&by_email).await.unwrap();
        storage.save(&by_name).await.unwrap();

        let found = storage
            .find_by_login("SHARED@EXAMPLE.COM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, by_name.id);
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_username() {
        let storage = MemoryAuthStorage::new();
        storage
            .save(&Credential::new("alice", "a@example.com", "h", vec![]))
            .await
            .unwrap();

        let dup = Credential::new("ALICE", "other@example.com", "h", vec![]);
        assert!(storage.save(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_save_updates_existing() {
        let storage = MemoryAuthStorage::new();
        let mut cred = Credential::new("alice", "a@example.com", "h", vec![]);
        storage.save(&cred).await.unwrap();

        cred.failed_attempts = 3;
        storage.save(&cred).await.unwrap();

        let loaded = storage.find_by_id(cred.id).await.unwrap().unwrap();
        assert_eq!(loaded.failed_attempts, 3);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let storage = MemoryAuthStorage::new();
        let token = token_for(Uuid::new_v4(), "s1", Duration::days(1));
        storage.create(&token).await.unwrap();

        storage.revoke(token.id).await.unwrap();
        storage.revoke(token.id).await.unwrap();
        storage.revoke(Uuid::new_v4()).await.unwrap();

        let loaded = storage.find_by_hash(&token.token_hash).await.unwrap().unwrap();
        assert!(loaded.revoked);
    }

    #[tokio::test]
    async fn test_rotate_outcomes() {
        let storage = MemoryAuthStorage::new();
        let identity = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let current = token_for(identity, "current", Duration::days(1));
        storage.create(&current).await.unwrap();

        let expires = now + Duration::days(1);
        let next_hash = RefreshToken::hash_token("next");
        match storage
            .rotate(&current.token_hash, &next_hash, expires, now)
            .await
            .unwrap()
        {
            RotationOutcome::Rotated {
                previous,
                replacement,
            } => {
                assert_eq!(previous.id, current.id);
                assert!(!previous.revoked);
                assert_eq!(replacement.identity_id, identity);
                assert_eq!(replacement.token_hash, next_hash);
            }
            other => panic!("expected Rotated, got {other:?}"),
        }

        let again_hash = RefreshToken::hash_token("again");
        let outcome = storage
            .rotate(&current.token_hash, &again_hash, expires, now)
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Revoked { .. }));
        // Nothing stored on a failed rotation
        assert!(storage.find_by_hash(&again_hash).await.unwrap().is_none());

        let outcome = storage.rotate("unknown", &again_hash, expires, now).await.unwrap();
        assert!(matches!(outcome, RotationOutcome::NotFound));

        let expired = token_for(identity, "expired", Duration::seconds(-5));
        storage.create(&expired).await.unwrap();
        let outcome = storage
            .rotate(&expired.token_hash, &again_hash, expires, now)
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Expired { .. }));
    }

    #[tokio::test]
    async fn test_revoke_all_for_identity() {
        let storage = MemoryAuthStorage::new();
        let identity = Uuid::new_v4();
        let other = Uuid::new_v4();

        storage.create(&token_for(identity, "a", Duration::days(1))).await.unwrap();
        storage.create(&token_for(identity, "b", Duration::days(1))).await.unwrap();
        storage.create(&token_for(other, "c", Duration::days(1))).await.unwrap();

        assert_eq!(storage.revoke_all_for_identity(identity).await.unwrap(), 2);
        assert_eq!(storage.revoke_all_for_identity(identity).await.unwrap(), 0);

        let now = OffsetDateTime::now_utc();
        assert!(storage.active_tokens_for(identity, now).is_empty());
        assert_eq!(storage.active_tokens_for(other, now).len(), 1);
    }
}
