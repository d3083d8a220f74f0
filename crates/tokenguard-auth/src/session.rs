//! Login, refresh, logout and request authentication.
//!
//! [`SessionService`] wires the lockout policy, the token codec, refresh
//! token rotation and the denylist into the flows an HTTP layer calls. Rate
//! limiting happens before these flows, in the middleware.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::lockout::LockoutPolicy;
use crate::password::verify_password;
use crate::storage::{CredentialStorage, RefreshTokenStorage, SharedCache, with_timeout};
use crate::token::{
    AccessTokenClaims, DenylistService, JwtService, RefreshTokenService, RotatedRefreshToken,
};
use crate::types::{Credential, Identity, RefreshTokenStatus};

/// Access and refresh token handed to a client after login or refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Identity the tokens were issued for.
    #[serde(flatten)]
    pub identity: Identity,

    /// Signed access token.
    pub access_token: String,

    /// Access token expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,

    /// Refresh token secret. Shown once.
    pub refresh_token: String,

    /// Refresh token expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_token_expires_at: OffsetDateTime,
}

/// Session flows over credential storage, refresh token storage and the
/// shared cache.
#[derive(Clone)]
pub struct SessionService {
    credentials: Arc<dyn CredentialStorage>,
    jwt: JwtService,
    refresh_tokens: RefreshTokenService,
    denylist: DenylistService,
    lockout: LockoutPolicy,
    access_token_ttl: Duration,
    store_timeout: Duration,
}

impl SessionService {
    /// Builds the service from configuration and injected backends.
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        credentials: Arc<dyn CredentialStorage>,
        refresh_storage: Arc<dyn RefreshTokenStorage>,
        cache: Arc<dyn SharedCache>,
    ) -> Self {
        let jwt = JwtService::from_config(&config.jwt);
        let store_timeout = config.database.timeout;

        Self {
            credentials,
            refresh_tokens: RefreshTokenService::new(
                refresh_storage,
                config.refresh_token.ttl,
                store_timeout,
            ),
            denylist: DenylistService::new(cache, jwt.clone(), config.cache.timeout),
            lockout: LockoutPolicy::from_config(&config.lockout),
            access_token_ttl: config.jwt.access_token_ttl,
            store_timeout,
            jwt,
        }
    }

    /// The token codec.
    #[must_use]
    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// The refresh token service.
    #[must_use]
    pub fn refresh_tokens(&self) -> &RefreshTokenService {
        &self.refresh_tokens
    }

    /// The access token denylist.
    #[must_use]
    pub fn denylist(&self) -> &DenylistService {
        &self.denylist
    }

    /// Authenticates by username or email and password.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown login or wrong password
    /// - `AccountDisabled` / `EmailNotVerified` for unusable accounts
    /// - `AccountLocked` if locked, or if this failure triggered the lock
    /// - `TransientStoreError` if storage is unavailable
    pub async fn login(&self, login: &str, password: &str) -> AuthResult<TokenPair> {
        let mut credential = with_timeout(
            self.store_timeout,
            "credential.find_by_login",
            self.credentials.find_by_login(login),
        )
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        if !credential.enabled {
            return Err(AuthError::AccountDisabled);
        }
        if !credential.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let now = OffsetDateTime::now_utc();
        self.lockout.check(&credential, now)?;

        if !verify_password(password, &credential.password_hash)? {
            let outcome = self.lockout.record_failure(&mut credential, now);
            self.save_credential(&credential).await?;
            return Err(outcome.into_error());
        }

        if self.lockout.record_success(&mut credential) {
            self.save_credential(&credential).await?;
        }

        let pair = self.issue_tokens(&credential).await?;
        tracing::info!(identity_id = %credential.id, "login succeeded");
        Ok(pair)
    }

    /// Issues a fresh access and refresh token for a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or the refresh token cannot be stored.
    pub async fn issue_tokens(&self, credential: &Credential) -> AuthResult<TokenPair> {
        let identity = credential.identity();
        let access = self
            .jwt
            .issue(&identity, &credential.roles, self.access_token_ttl)?;
        let refresh = self.refresh_tokens.issue(identity.id).await?;

        tracing::debug!(
            identity_id = %identity.id,
            refresh_token_id = %refresh.record.id,
            "tokens issued"
        );
        Ok(TokenPair {
            identity,
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.plaintext,
            refresh_token_expires_at: refresh.record.expires_at,
        })
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// The owning credential is loaded and checked before rotation, so a
    /// refused refresh leaves the presented token usable. If anything fails
    /// after rotation, the replacement is revoked before the error returns.
    ///
    /// A `TokenRevoked` error means the presented token was already used.
    /// It is logged and returned; the token family is not revoked here.
    ///
    /// # Errors
    ///
    /// - `TokenNotFound`, `TokenRevoked`, `TokenExpired` from rotation
    /// - `InvalidCredentials` if the owning credential no longer exists
    /// - `AccountDisabled` if the owning account is disabled
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let now = OffsetDateTime::now_utc();
        let owner = match self.refresh_tokens.find_by_plaintext(refresh_token).await? {
            Some(record) if record.status_at(now) == RefreshTokenStatus::Active => {
                Some(self.refreshable_credential(record.identity_id).await?)
            }
            // Rotation reports the precise outcome
            _ => None,
        };

        let rotated = self.refresh_tokens.rotate(refresh_token).await?;

        match self.complete_refresh(owner, &rotated).await {
            Ok(pair) => Ok(pair),
            Err(e) => {
                if let Err(revoke_err) = self.refresh_tokens.revoke(&rotated.issued.record).await {
                    tracing::warn!(
                        token_id = %rotated.issued.record.id,
                        error = %revoke_err,
                        "failed to revoke replacement refresh token"
                    );
                }
                Err(e)
            }
        }
    }

    async fn complete_refresh(
        &self,
        owner: Option<Credential>,
        rotated: &RotatedRefreshToken,
    ) -> AuthResult<TokenPair> {
        let credential = match owner {
            Some(credential) => credential,
            None => self.refreshable_credential(rotated.identity_id).await?,
        };

        let identity = credential.identity();
        let access = self
            .jwt
            .issue(&identity, &credential.roles, self.access_token_ttl)?;

        Ok(TokenPair {
            identity,
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: rotated.issued.plaintext.clone(),
            refresh_token_expires_at: rotated.issued.record.expires_at,
        })
    }

    async fn refreshable_credential(&self, identity_id: Uuid) -> AuthResult<Credential> {
        let credential = with_timeout(
            self.store_timeout,
            "credential.find_by_id",
            self.credentials.find_by_id(identity_id),
        )
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        if !credential.enabled {
            return Err(AuthError::AccountDisabled);
        }
        Ok(credential)
    }

    /// Ends a session.
    ///
    /// Denylisting the access token is best effort: failures are logged and
    /// never fail the logout. An unknown refresh token is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if revoking a known refresh token fails.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<()> {
        if let Some(access_token) = access_token.filter(|t| !t.trim().is_empty()) {
            if let Err(e) = self.denylist.blacklist(access_token).await {
                tracing::warn!(error = %e, "failed to denylist access token during logout");
            }
        }

        if let Some(refresh_token) = refresh_token.filter(|t| !t.trim().is_empty()) {
            match self.refresh_tokens.find_by_plaintext(refresh_token).await? {
                Some(record) => self.refresh_tokens.revoke(&record).await?,
                None => tracing::debug!("logout with unknown refresh token"),
            }
        }

        Ok(())
    }

    /// Validates a bearer access token for a request.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`, `TokenExpired`, `MalformedToken` from the codec
    /// - `TokenRevoked` if the token is denylisted
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<AccessTokenClaims> {
        let claims = self.jwt.verify(access_token)?;
        if self.denylist.is_blacklisted(access_token).await {
            tracing::debug!(sub = %claims.sub, "denylisted access token rejected");
            return Err(AuthError::TokenRevoked);
        }
        Ok(claims)
    }

    async fn save_credential(&self, credential: &Credential) -> AuthResult<()> {
        with_timeout(
            self.store_timeout,
            "credential.save",
            self.credentials.save(credential),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::password::hash_password;
    use crate::storage::MemoryAuthStorage;

    const PASSWORD: &str = "s3cret-password";

    struct Fixture {
        storage: Arc<MemoryAuthStorage>,
        sessions: SessionService,
        credential: Credential,
    }

    async fn fixture() -> Fixture {
        let mut config = AuthConfig::default();
        config.jwt.secret = "session-test-secret-at-least-32-bytes!".to_string();
        config.lockout.max_failed_attempts = 3;

        let storage = Arc::new(MemoryAuthStorage::new());
        let credential = Credential::new(
            "alice",
            "alice@example.com",
            hash_password(PASSWORD).unwrap(),
            vec!["USER".to_string()],
        );
        storage.save(&credential).await.unwrap();

        let sessions = SessionService::new(
            &config,
            storage.clone(),
            storage.clone(),
            Arc::new(LocalCache::new()),
        );
        Fixture {
            storage,
            sessions,
            credential,
        }
    }

    async fn reload(f: &Fixture) -> Credential {
        f.storage
            .find_by_id(f.credential.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_issues_tokens() {
        let f = fixture().await;
        let pair = f.sessions.login("ALICE@example.com", PASSWORD).await.unwrap();

        assert_eq!(pair.identity.id, f.credential.id);
        let claims = f.sessions.authenticate(&pair.access_token).await.unwrap();
        assert_eq!(claims.preferred_username, "alice");
        assert_eq!(claims.roles, vec!["USER".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_login() {
        let f = fixture().await;
        assert!(matches!(
            f.sessions.login("nobody", PASSWORD).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_lockout_after_max_failures() {
        let f = fixture().await;

        for _ in 0..2 {
            assert!(matches!(
                f.sessions.login("alice", "wrong").await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            f.sessions.login("alice", "wrong").await,
            Err(AuthError::AccountLocked { locked_until: Some(_) })
        ));

        let stored = reload(&f).await;
        assert_eq!(stored.failed_attempts, 0);
        assert!(stored.locked_until.is_some());

        // Correct password is not even checked while locked
        assert!(matches!(
            f.sessions.login("alice", PASSWORD).await,
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failed_counter() {
        let f = fixture().await;
        let _ = f.sessions.login("alice", "wrong").await;
        assert_eq!(reload(&f).await.failed_attempts, 1);

        f.sessions.login("alice", PASSWORD).await.unwrap();
        assert_eq!(reload(&f).await.failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_disabled_and_unverified_accounts() {
        let f = fixture().await;
        let mut cred = reload(&f).await;
        cred.email_verified = false;
        f.storage.save(&cred).await.unwrap();
        assert!(matches!(
            f.sessions.login("alice", PASSWORD).await,
            Err(AuthError::EmailNotVerified)
        ));

        cred.enabled = false;
        f.storage.save(&cred).await.unwrap();
        assert!(matches!(
            f.sessions.login("alice", PASSWORD).await,
            Err(AuthError::AccountDisabled)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_detects_reuse() {
        let f = fixture().await;
        let pair = f.sessions.login("alice", PASSWORD).await.unwrap();

        let refreshed = f.sessions.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(refreshed.refresh_token, pair.refresh_token);
        assert!(f.sessions.authenticate(&refreshed.access_token).await.is_ok());

        assert!(matches!(
            f.sessions.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        // Reuse is reported, not escalated: the newest token still works
        assert!(f.sessions.refresh(&refreshed.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_for_disabled_account() {
        let f = fixture().await;
        let pair = f.sessions.login("alice", PASSWORD).await.unwrap();

        let mut cred = reload(&f).await;
        cred.enabled = false;
        f.storage.save(&cred).await.unwrap();

        assert!(matches!(
            f.sessions.refresh(&pair.refresh_token).await,
            Err(AuthError::AccountDisabled)
        ));

        // Nothing rotated: the presented token is the only active one
        let active = f
            .storage
            .active_tokens_for(f.credential.id, OffsetDateTime::now_utc());
        assert_eq!(active.len(), 1);
        assert_eq!(
            active[0].token_hash,
            crate::types::RefreshToken::hash_token(&pair.refresh_token)
        );
        assert_eq!(f.storage.refresh_token_count(), 1);
    }

    /// Credential storage whose reads can be switched to fail.
    struct FlakyCredentials {
        inner: Arc<MemoryAuthStorage>,
        failing: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl CredentialStorage for FlakyCredentials {
        async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(AuthError::transient("store unavailable"));
            }
            self.inner.find_by_id(id).await
        }

        async fn find_by_login(&self, login: &str) -> AuthResult<Option<Credential>> {
            self.inner.find_by_login(login).await
        }

        async fn save(&self, credential: &Credential) -> AuthResult<()> {
            self.inner.save(credential).await
        }
    }

    #[tokio::test]
    async fn test_refresh_survives_transient_credential_failure() {
        let f = fixture().await;
        let credentials = Arc::new(FlakyCredentials {
            inner: f.storage.clone(),
            failing: std::sync::atomic::AtomicBool::new(false),
        });
        let mut config = AuthConfig::default();
        config.jwt.secret = "session-test-secret-at-least-32-bytes!".to_string();
        let sessions = SessionService::new(
            &config,
            credentials.clone(),
            f.storage.clone(),
            Arc::new(LocalCache::new()),
        );

        let pair = sessions.login("alice", PASSWORD).await.unwrap();

        credentials
            .failing
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            sessions.refresh(&pair.refresh_token).await,
            Err(AuthError::TransientStoreError { .. })
        ));
        assert_eq!(
            f.storage
                .active_tokens_for(f.credential.id, OffsetDateTime::now_utc())
                .len(),
            1
        );

        // The client retries with the same token once the store is back
        credentials
            .failing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let refreshed = sessions.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(refreshed.refresh_token, pair.refresh_token);
    }

    #[tokio::test]
    async fn test_logout_revokes_both_tokens() {
        let f = fixture().await;
        let pair = f.sessions.login("alice", PASSWORD).await.unwrap();

        f.sessions
            .logout(Some(&pair.access_token), Some(&pair.refresh_token))
            .await
            .unwrap();

        assert!(matches!(
            f.sessions.authenticate(&pair.access_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            f.sessions.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_logout_tolerates_garbage() {
        let f = fixture().await;
        f.sessions
            .logout(Some("not-a-jwt"), Some("unknown-refresh-token"))
            .await
            .unwrap();
        f.sessions.logout(None, None).await.unwrap();
    }
}
