//! Authentication configuration.
//!
//! All tunables consumed by the core: signing secret and token lifetimes,
//! lockout thresholds, per-route rate limit rules, and the cache/database
//! backends. Configuration objects are passed into constructors; nothing here
//! is global.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Minimum signing secret length (in bytes) considered safe for production.
pub const MIN_SECRET_LEN: usize = 32;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [jwt]
/// secret = "change-me-to-at-least-32-bytes-of-entropy"
/// access_token_ttl = "15m"
///
/// [refresh_token]
/// ttl = "30d"
///
/// [lockout]
/// max_failed_attempts = 5
/// lockout_duration = "15m"
///
/// [[rate_limiting.rules]]
/// method = "POST"
/// path = "/api/v1/auth/login"
/// limit = 5
/// window = "1m"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Access token signing configuration.
    pub jwt: JwtConfig,

    /// Refresh token configuration.
    pub refresh_token: RefreshTokenConfig,

    /// Account lockout configuration.
    pub lockout: LockoutConfig,

    /// Rate limiting configuration.
    pub rate_limiting: RateLimitingConfig,

    /// Shared cache configuration.
    pub cache: CacheConfig,

    /// Relational store configuration.
    pub database: DatabaseConfig,
}

/// Access token signing configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Symmetric HMAC secret. Shorter than 32 bytes works but logs a warning.
    pub secret: String,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,

    /// Optional `iss` claim added to issued tokens and required on verify.
    pub issuer: Option<String>,

    /// Add a unique `jti` claim to every token (used as the denylist key).
    pub include_jti: bool,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_token_ttl: Duration::from_secs(15 * 60),
            issuer: None,
            include_jti: true,
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("issuer", &self.issuer)
            .field("include_jti", &self.include_jti)
            .finish()
    }
}

/// Refresh token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshTokenConfig {
    /// Lifetime of each refresh token; rotation issues a fresh full lifetime.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for RefreshTokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

/// Account lockout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins that trigger a lock.
    pub max_failed_attempts: u32,

    /// How long a lock lasts.
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// A fixed-window rule: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitRule {
    /// Requests allowed per window.
    pub limit: u64,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RateLimitRule {
    /// Creates a new rule.
    #[must_use]
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// A rate limit rule bound to one method and route path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteRule {
    /// HTTP method, matched case-insensitively.
    pub method: String,

    /// Exact request path.
    pub path: String,

    /// Requests allowed per window.
    pub limit: u64,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RouteRule {
    /// Creates a new route rule.
    #[must_use]
    pub fn new(method: &str, path: &str, limit: u64, window: Duration) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            limit,
            window,
        }
    }

    /// Returns the limit/window pair of this rule.
    #[must_use]
    pub fn rule(&self) -> RateLimitRule {
        RateLimitRule::new(self.limit, self.window)
    }
}

/// Rate limiting configuration for authentication endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Enable the rate limiter.
    pub enabled: bool,

    /// Only requests under this path prefix are limited by the middleware.
    pub path_prefix: String,

    /// Rule applied to routes under the prefix without their own rule.
    pub default_rule: RateLimitRule,

    /// Per method+path rules.
    pub rules: Vec<RouteRule>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "/api/v1/auth".to_string(),
            default_rule: RateLimitRule::new(100, Duration::from_secs(60)),
            rules: vec![
                RouteRule::new("POST", "/api/v1/auth/login", 5, Duration::from_secs(60)),
                RouteRule::new("POST", "/api/v1/auth/register", 10, Duration::from_secs(600)),
                RouteRule::new(
                    "POST",
                    "/api/v1/auth/password-reset/request",
                    3,
                    Duration::from_secs(900),
                ),
            ],
        }
    }
}

/// Which shared cache implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// In-process cache. Only correct for a single instance.
    #[default]
    Local,
    /// Redis shared by all instances.
    Redis,
}

/// Shared cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache implementation.
    pub backend: CacheBackendKind,

    /// Redis connection URL (e.g., "redis://localhost:6379").
    pub redis_url: Option<String>,

    /// Connection pool size.
    pub pool_size: usize,

    /// Upper bound for every cache round trip.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Local,
            redis_url: None,
            pool_size: 10,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: Option<String>,

    /// Maximum pool connections.
    pub max_connections: u32,

    /// Upper bound for every store operation, including pool acquisition.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The signing secret is empty
    /// - A token lifetime or the lockout duration is zero
    /// - `max_failed_attempts` is zero
    /// - A rate limit rule has a zero limit or window
    /// - The redis cache backend is selected without a URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::Missing("jwt.secret".to_string()));
        }

        if self.jwt.access_token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_ttl must be > 0".to_string(),
            ));
        }

        if self.refresh_token.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_token.ttl must be > 0".to_string(),
            ));
        }

        if self.lockout.max_failed_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_failed_attempts must be > 0".to_string(),
            ));
        }

        if self.lockout.lockout_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "lockout_duration must be > 0".to_string(),
            ));
        }

        let rules = std::iter::once(("default", self.rate_limiting.default_rule)).chain(
            self.rate_limiting
                .rules
                .iter()
                .map(|r| (r.path.as_str(), r.rule())),
        );
        for (name, rule) in rules {
            if rule.limit == 0 || rule.window.is_zero() {
                return Err(ConfigError::InvalidValue(format!(
                    "rate limit rule '{}' needs a non-zero limit and window",
                    name
                )));
            }
        }

        if self.cache.backend == CacheBackendKind::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::Missing("cache.redis_url".to_string()));
        }

        Ok(())
    }

    /// Returns `true` if the signing secret is shorter than recommended.
    #[must_use]
    pub fn has_weak_secret(&self) -> bool {
        self.jwt.secret.len() < MIN_SECRET_LEN
    }
}

/// Loading configuration from files and the environment.
pub mod loader {
    use std::path::PathBuf;

    use ::config::{Config, Environment, File};

    use super::{AuthConfig, ConfigError};

    /// Default configuration file looked up when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "tokenguard.toml";

    /// Loads configuration from an optional TOML file plus environment overrides.
    ///
    /// Environment variables use the `TOKENGUARD` prefix and `__` as the
    /// section separator, e.g. `TOKENGUARD__JWT__SECRET=...` or
    /// `TOKENGUARD__LOCKOUT__MAX_FAILED_ATTEMPTS=3`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load_config(path: Option<&str>) -> Result<AuthConfig, ConfigError> {
        let mut builder = Config::builder();

        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(ConfigError::Load(format!(
                "config file not found: {}",
                pathbuf.display()
            )));
        }

        builder = builder.add_source(
            Environment::with_prefix("TOKENGUARD")
                .try_parsing(true)
                .separator("__"),
        );

        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: AuthConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;

        merged.validate()?;
        if merged.has_weak_secret() {
            tracing::warn!(
                min_len = super::MIN_SECRET_LEN,
                "JWT secret is shorter than recommended; override it in production"
            );
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt.secret = "0123456789abcdef0123456789abcdef".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.jwt.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token.ttl, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.lockout.max_failed_attempts, 5);
        assert_eq!(config.lockout.lockout_duration, Duration::from_secs(900));
        assert_eq!(config.cache.backend, CacheBackendKind::Local);
        assert!(config.jwt.include_jti);
    }

    #[test]
    fn test_default_rate_limit_rules() {
        let rate = RateLimitingConfig::default();
        assert_eq!(rate.default_rule, RateLimitRule::new(100, Duration::from_secs(60)));

        let login = rate
            .rules
            .iter()
            .find(|r| r.path == "/api/v1/auth/login")
            .unwrap();
        assert_eq!(login.rule(), RateLimitRule::new(5, Duration::from_secs(60)));

        let reset = rate
            .rules
            .iter()
            .find(|r| r.path == "/api/v1/auth/password-reset/request")
            .unwrap();
        assert_eq!(reset.limit, 3);
        assert_eq!(reset.window, Duration::from_secs(900));
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("jwt.secret"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert_ok!(valid_config().validate());
        assert!(!valid_config().has_weak_secret());
    }

    #[test]
    fn test_short_secret_is_valid_but_weak() {
        let mut config = valid_config();
        config.jwt.secret = "short".to_string();
        assert_ok!(config.validate());
        assert!(config.has_weak_secret());
    }

    #[test]
    fn test_zero_max_failed_attempts_fails_validation() {
        let mut config = valid_config();
        config.lockout.max_failed_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_failed_attempts"));
    }

    #[test]
    fn test_zero_limit_rule_fails_validation() {
        let mut config = valid_config();
        config
            .rate_limiting
            .rules
            .push(RouteRule::new("POST", "/api/v1/auth/x", 0, Duration::from_secs(1)));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("/api/v1/auth/x"));
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = valid_config();
        config.cache.backend = CacheBackendKind::Redis;
        assert_err!(config.validate());

        config.cache.redis_url = Some("redis://localhost:6379".to_string());
        assert_ok!(config.validate());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = valid_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_humantime_deserialization() {
        let json = r#"{
            "jwt": { "secret": "s", "access_token_ttl": "5m" },
            "lockout": { "max_failed_attempts": 3, "lockout_duration": "1h" },
            "cache": { "backend": "redis", "redis_url": "redis://cache:6379" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.jwt.access_token_ttl, Duration::from_secs(300));
        assert_eq!(config.lockout.max_failed_attempts, 3);
        assert_eq!(config.lockout.lockout_duration, Duration::from_secs(3600));
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        // Unspecified sections fall back to defaults
        assert_eq!(config.refresh_token.ttl, Duration::from_secs(30 * 24 * 3600));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = loader::load_config(Some("/nonexistent/tokenguard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");

        let err = ConfigError::Missing("required_field".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required configuration: required_field"
        );
    }
}
