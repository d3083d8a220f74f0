//! Storage traits for credentials, refresh tokens and the shared cache.
//!
//! # Implementations
//!
//! - [`MemoryAuthStorage`] and [`LocalCache`](crate::cache::LocalCache) -
//!   in-process backends for tests and single-instance deployments
//! - `tokenguard-auth-postgres` - PostgreSQL credential and refresh token storage
//! - `tokenguard-auth-redis` - Redis shared cache

pub mod cache;
pub mod credential;
pub mod memory;
pub mod refresh_token;

pub use cache::SharedCache;
pub use credential::CredentialStorage;
pub use memory::MemoryAuthStorage;
pub use refresh_token::{RefreshTokenStorage, RotationOutcome};

use std::future::Future;
use std::time::Duration;

use crate::AuthResult;
use crate::error::AuthError;

/// Bounds a store or cache operation.
///
/// An elapsed timeout surfaces as [`AuthError::TransientStoreError`]; the
/// operation is never retried here.
pub async fn with_timeout<T, F>(timeout: Duration, operation: &str, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        tracing::warn!(
            operation,
            timeout_ms = timeout.as_millis() as u64,
            "store operation timed out"
        );
        AuthError::transient(format!(
            "{} timed out after {}ms",
            operation,
            timeout.as_millis()
        ))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout(Duration::from_secs(1), "noop", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = with_timeout::<(), _>(Duration::from_secs(1), "noop", async {
            Err(AuthError::TokenNotFound)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed_is_transient() {
        let err = with_timeout::<(), _>(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::TransientStoreError { .. }));
        assert!(err.to_string().contains("slow"));
    }
}
