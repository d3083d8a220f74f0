//! Fixed-window rate limiter for authentication endpoints.
//!
//! Each check is one atomic increment in the shared cache; the first
//! increment of a window sets its expiry. Denied requests are still counted,
//! so a client hammering a route slightly over-counts near the window edge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::AuthResult;
use crate::config::{RateLimitRule, RateLimitingConfig};
use crate::storage::{SharedCache, with_timeout};

/// Cache key prefix for rate limit counters.
pub const KEY_PREFIX: &str = "rl:";

/// Remaining-count value reported for a denied request.
pub const DENIED: i64 = -1;

/// Client name used when a request carries no usable address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Counts requests per key in the shared cache.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn SharedCache>,
    timeout: Duration,
}

impl RateLimiter {
    /// Creates a limiter over `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn SharedCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Consumes one request for `key`.
    ///
    /// Returns the remaining count (`limit - value`, never negative) when
    /// allowed, or [`DENIED`] once the window's count exceeds `limit`.
    ///
    /// # Errors
    ///
    /// Returns `TransientStoreError` if the cache is unavailable or times out.
    pub async fn try_consume(&self, key: &str, limit: u64, window: Duration) -> AuthResult<i64> {
        let cache_key = format!("{}{}", KEY_PREFIX, key);
        let value = with_timeout(
            self.timeout,
            "rate_limit.increment",
            self.cache.increment_and_maybe_expire(&cache_key, window),
        )
        .await?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        if value <= limit {
            Ok(limit - value)
        } else {
            tracing::debug!(key = %key, count = value, limit, "rate limit exceeded");
            Ok(DENIED)
        }
    }

    /// Consumes one request for `key` under `rule`.
    ///
    /// # Errors
    ///
    /// Returns `TransientStoreError` if the cache is unavailable or times out.
    pub async fn try_consume_rule(&self, key: &str, rule: RateLimitRule) -> AuthResult<i64> {
        self.try_consume(key, rule.limit, rule.window).await
    }
}

/// Rule lookup by method and path.
#[derive(Debug, Clone)]
pub struct RateLimitRules {
    path_prefix: String,
    default_rule: RateLimitRule,
    routes: HashMap<(String, String), RateLimitRule>,
}

impl RateLimitRules {
    /// Builds the lookup table from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        let routes = config
            .rules
            .iter()
            .map(|r| ((r.method.to_ascii_uppercase(), r.path.clone()), r.rule()))
            .collect();

        Self {
            path_prefix: config.path_prefix.clone(),
            default_rule: config.default_rule,
            routes,
        }
    }

    /// Returns the rule for a request, or `None` if the path is not limited.
    #[must_use]
    pub fn rule_for(&self, method: &str, path: &str) -> Option<RateLimitRule> {
        if !path.starts_with(&self.path_prefix) {
            return None;
        }
        let rule = self
            .routes
            .get(&(method.to_ascii_uppercase(), path.to_string()))
            .copied()
            .unwrap_or(self.default_rule);
        Some(rule)
    }
}

/// Builds the bucket key `{client}:{METHOD}:{path}`.
///
/// The client is the first entry of `X-Forwarded-For` when present and
/// non-blank, else the peer address.
#[must_use]
pub fn client_key(
    forwarded_for: Option<&str>,
    remote_addr: Option<&str>,
    method: &str,
    path: &str,
) -> String {
    let client = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or(remote_addr)
        .unwrap_or(UNKNOWN_CLIENT);

    format!("{}:{}:{}", client, method, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(LocalCache::new()), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_six_calls_with_limit_five() {
        let limiter = limiter();
        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(
                limiter
                    .try_consume("1.2.3.4:POST:/api/v1/auth/login", 5, Duration::from_secs(60))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(results, vec![4, 3, 2, 1, 0, DENIED]);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        assert_eq!(limiter.try_consume("a", 1, window).await.unwrap(), 0);
        assert_eq!(limiter.try_consume("a", 1, window).await.unwrap(), DENIED);
        assert_eq!(limiter.try_consume("b", 1, window).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        limiter.try_consume("k", 1, window).await.unwrap();
        assert_eq!(limiter.try_consume("k", 1, window).await.unwrap(), DENIED);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.try_consume("k", 1, window).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_uses_prefixed_key() {
        let cache = LocalCache::new();
        let limiter = RateLimiter::new(Arc::new(cache.clone()), Duration::from_secs(2));
        limiter
            .try_consume("k", 5, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.exists("rl:k").await.unwrap());
        assert!(!cache.exists("k").await.unwrap());
    }

    #[test]
    fn test_rule_lookup() {
        let rules = RateLimitRules::from_config(&RateLimitingConfig::default());

        assert_eq!(
            rules.rule_for("POST", "/api/v1/auth/login"),
            Some(RateLimitRule::new(5, Duration::from_secs(60)))
        );
        assert_eq!(
            rules.rule_for("post", "/api/v1/auth/register"),
            Some(RateLimitRule::new(10, Duration::from_secs(600)))
        );
        // Other method on a configured path falls back to the default
        assert_eq!(
            rules.rule_for("GET", "/api/v1/auth/login"),
            Some(RateLimitRule::new(100, Duration::from_secs(60)))
        );
        assert_eq!(rules.rule_for("GET", "/api/v1/users"), None);
    }

    #[test]
    fn test_client_key() {
        assert_eq!(
            client_key(Some("10.0.0.1, 10.0.0.2"), Some("127.0.0.1"), "POST", "/p"),
            "10.0.0.1:POST:/p"
        );
        assert_eq!(
            client_key(Some("  "), Some("127.0.0.1"), "POST", "/p"),
            "127.0.0.1:POST:/p"
        );
        assert_eq!(client_key(None, None, "GET", "/p"), "unknown:GET:/p");
    }
}
