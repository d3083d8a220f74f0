//! Access token denylist.
//!
//! Logout cannot make a signed token unverifiable, so revoked access tokens
//! are recorded in the shared cache until they would have expired anyway.
//! Keys are `auth:blacklist:access:{jti}`, or the SHA-256 of the raw token
//! when it carries no `jti`.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{SharedCache, with_timeout};
use crate::token::jwt::{AccessTokenClaims, JwtService};

/// Cache key prefix for denylisted access tokens.
pub const KEY_PREFIX: &str = "auth:blacklist:access:";

/// TTL used when the remaining token lifetime is unknown or already elapsed.
pub const MIN_TTL: Duration = Duration::from_secs(60);

/// A written denylist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenylistEntry {
    /// Full cache key.
    pub key: String,

    /// Expiry given to the entry.
    pub ttl: Duration,
}

/// Records and checks revoked access tokens in a [`SharedCache`].
#[derive(Clone)]
pub struct DenylistService {
    cache: Arc<dyn SharedCache>,
    jwt: JwtService,
    timeout: Duration,
}

impl DenylistService {
    /// Creates a denylist over `cache`, reading claims with `jwt`.
    #[must_use]
    pub fn new(cache: Arc<dyn SharedCache>, jwt: JwtService, timeout: Duration) -> Self {
        Self {
            cache,
            jwt,
            timeout,
        }
    }

    /// Denylists an access token until its natural expiry.
    ///
    /// A token that no longer verifies is still recorded under the hash of
    /// its raw string with [`MIN_TTL`].
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the token is empty
    /// - `TransientStoreError` if the cache write fails or times out
    pub async fn blacklist(&self, access_token: &str) -> AuthResult<DenylistEntry> {
        if access_token.trim().is_empty() {
            return Err(AuthError::malformed_token("access token must be provided"));
        }

        let entry = match self.jwt.verify(access_token) {
            Ok(claims) => DenylistEntry {
                key: key_for(&claims, access_token),
                ttl: ttl_for(&claims, OffsetDateTime::now_utc()),
            },
            Err(e) => {
                tracing::debug!(error = %e, "denylisting unverifiable token by hash");
                DenylistEntry {
                    key: format!("{}{}", KEY_PREFIX, hash_token(access_token)),
                    ttl: MIN_TTL,
                }
            }
        };

        with_timeout(
            self.timeout,
            "denylist.set",
            self.cache.set(&entry.key, "1", entry.ttl),
        )
        .await?;

        tracing::info!(key = %entry.key, ttl_secs = entry.ttl.as_secs(), "access token denylisted");
        Ok(entry)
    }

    /// Returns `true` if the token is denylisted.
    ///
    /// This is an overlay on signature and expiry checks, not a substitute:
    /// any failure (unverifiable token, cache error) yields `false`.
    pub async fn is_blacklisted(&self, access_token: &str) -> bool {
        if access_token.trim().is_empty() {
            return false;
        }

        let Ok(claims) = self.jwt.verify(access_token) else {
            return false;
        };
        let key = key_for(&claims, access_token);

        match with_timeout(self.timeout, "denylist.exists", self.cache.exists(&key)).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "denylist lookup failed");
                false
            }
        }
    }
}

fn key_for(claims: &AccessTokenClaims, raw: &str) -> String {
    match claims.jti.as_deref().filter(|jti| !jti.trim().is_empty()) {
        Some(jti) => format!("{}{}", KEY_PREFIX, jti),
        None => format!("{}{}", KEY_PREFIX, hash_token(raw)),
    }
}

/// Remaining lifetime at sub-second precision, so the entry never outlives
/// the token.
fn ttl_for(claims: &AccessTokenClaims, now: OffsetDateTime) -> Duration {
    claims
        .expires_at()
        .and_then(|exp| Duration::try_from(exp - now).ok())
        .filter(|ttl| !ttl.is_zero())
        .unwrap_or(MIN_TTL)
}

fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::types::Identity;
    use uuid::Uuid;

    const SECRET: &str = "denylist-test-secret-of-at-least-32-bytes";

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    fn setup(jwt: JwtService) -> (LocalCache, DenylistService) {
        let cache = LocalCache::new();
        let service = DenylistService::new(Arc::new(cache.clone()), jwt, Duration::from_secs(2));
        (cache, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_blacklist_then_expire() {
        let jwt = JwtService::new(SECRET);
        let (_, denylist) = setup(jwt.clone());
        let issued = jwt.issue(&identity(), &[], Duration::from_secs(600)).unwrap();

        assert!(!denylist.is_blacklisted(&issued.token).await);

        let entry = denylist.blacklist(&issued.token).await.unwrap();
        let jti = issued.jti.unwrap();
        assert_eq!(entry.key, format!("auth:blacklist:access:{jti}"));
        assert!(entry.ttl <= Duration::from_secs(600));
        assert!(entry.ttl >= Duration::from_secs(590));
        assert!(denylist.is_blacklisted(&issued.token).await);

        // Entry lapses with the token's remaining lifetime
        tokio::time::advance(entry.ttl + Duration::from_secs(1)).await;
        assert!(!denylist.is_blacklisted(&issued.token).await);
    }

    #[tokio::test]
    async fn test_blacklist_without_jti_uses_token_hash() {
        let jwt = JwtService::new(SECRET).with_jti(false);
        let (cache, denylist) = setup(jwt.clone());
        let issued = jwt.issue(&identity(), &[], Duration::from_secs(600)).unwrap();

        let entry = denylist.blacklist(&issued.token).await.unwrap();
        assert_eq!(
            entry.key,
            format!("{}{}", KEY_PREFIX, hash_token(&issued.token))
        );
        assert!(cache.exists(&entry.key).await.unwrap());
        assert!(denylist.is_blacklisted(&issued.token).await);
    }

    #[tokio::test]
    async fn test_unverifiable_token_is_denylisted_by_hash() {
        let (cache, denylist) = setup(JwtService::new(SECRET));

        let entry = denylist.blacklist("garbage.token.value").await.unwrap();
        assert_eq!(entry.ttl, MIN_TTL);
        assert_eq!(
            entry.key,
            format!("{}{}", KEY_PREFIX, hash_token("garbage.token.value"))
        );
        assert!(cache.exists(&entry.key).await.unwrap());

        // Invalid tokens never report as denylisted
        assert!(!denylist.is_blacklisted("garbage.token.value").await);
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let (_, denylist) = setup(JwtService::new(SECRET));
        assert!(matches!(
            denylist.blacklist("  ").await,
            Err(AuthError::MalformedToken { .. })
        ));
        assert!(!denylist.is_blacklisted("").await);
    }

    #[test]
    fn test_ttl_floor() {
        let claims = AccessTokenClaims::new(
            &identity(),
            &[],
            OffsetDateTime::now_utc() - time::Duration::hours(1),
            Duration::from_secs(60),
        );
        assert_eq!(ttl_for(&claims, OffsetDateTime::now_utc()), MIN_TTL);
    }

    #[test]
    fn test_ttl_ends_no_later_than_token() {
        let claims = AccessTokenClaims::new(
            &identity(),
            &[],
            OffsetDateTime::now_utc(),
            Duration::from_secs(600),
        );
        let exp = claims.expires_at().unwrap();
        // 700ms into the second the token expires on
        let now = exp.replace_nanosecond(700_000_000).unwrap() - time::Duration::seconds(10);

        let ttl = ttl_for(&claims, now);
        assert_eq!(ttl, Duration::from_millis(9_300));
        assert!(now + ttl <= exp);
    }

    #[test]
    fn test_blank_jti_falls_back_to_hash() {
        let mut claims = AccessTokenClaims::new(
            &identity(),
            &[],
            OffsetDateTime::now_utc(),
            Duration::from_secs(60),
        );
        claims.jti = Some(" ".to_string());
        assert_eq!(
            key_for(&claims, "raw"),
            format!("{}{}", KEY_PREFIX, hash_token("raw"))
        );
    }
}
