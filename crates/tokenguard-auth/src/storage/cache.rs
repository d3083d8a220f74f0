//! Shared cache trait.
//!
//! The denylist and the rate limiter keep all of their state behind this
//! interface so every service instance sees the same entries.

use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;

/// Key-value cache shared by all service instances.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Atomically increments the counter at `key` and returns the new value.
    ///
    /// When the increment creates the counter (value 1), its expiry is set to
    /// `ttl`. Later increments leave the expiry untouched.
    ///
    /// # Errors
    ///
    /// Returns `TransientStoreError` if the cache is unreachable or times out.
    async fn increment_and_maybe_expire(&self, key: &str, ttl: Duration) -> AuthResult<i64>;

    /// Stores `value` at `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `TransientStoreError` if the cache is unreachable or times out.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<()>;

    /// Returns `true` if an unexpired entry exists at `key`.
    ///
    /// # Errors
    ///
    /// Returns `TransientStoreError` if the cache is unreachable or times out.
    async fn exists(&self, key: &str) -> AuthResult<bool>;

    /// Name of the backend, for logs.
    fn backend_name(&self) -> &'static str;
}
