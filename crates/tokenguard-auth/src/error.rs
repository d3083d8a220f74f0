//! Authentication error types.
//!
//! This module defines every outcome the core can report to a caller. Each
//! variant has a stable code so the HTTP boundary can translate it without
//! inspecting messages.

use std::fmt;

use time::OffsetDateTime;

/// Errors that can occur during credential and token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown login, wrong password or unknown refresh token.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The account is temporarily locked after repeated failed logins.
    #[error("Account locked")]
    AccountLocked {
        /// When the lock elapses, if known.
        locked_until: Option<OffsetDateTime>,
    },

    /// The account has been disabled.
    #[error("Account disabled")]
    AccountDisabled,

    /// The account's email address has not been verified yet.
    #[error("Email not verified")]
    EmailNotVerified,

    /// No refresh token record matches the presented secret.
    #[error("Token not found")]
    TokenNotFound,

    /// The token was revoked. For refresh tokens this is the reuse signal.
    #[error("Token revoked")]
    TokenRevoked,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token signature does not match.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token could not be parsed.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of what could not be parsed.
        message: String,
    },

    /// Too many requests for the caller and route.
    #[error("Too many requests")]
    RateLimited,

    /// The relational store or shared cache is unavailable or timed out.
    #[error("Store unavailable: {message}")]
    TransientStoreError {
        /// Description of the store failure.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `AccountLocked` error.
    #[must_use]
    pub fn account_locked(locked_until: Option<OffsetDateTime>) -> Self {
        Self::AccountLocked { locked_until }
    }

    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `TransientStoreError`.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientStoreError {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller caused this error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::TransientStoreError { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound
                | Self::TokenRevoked
                | Self::TokenExpired
                | Self::InvalidSignature
                | Self::MalformedToken { .. }
        )
    }

    /// Returns `true` if retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStoreError { .. } | Self::RateLimited)
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials => ErrorCategory::Authentication,
            Self::AccountLocked { .. } => ErrorCategory::Authentication,
            Self::AccountDisabled => ErrorCategory::Authentication,
            Self::EmailNotVerified => ErrorCategory::Authentication,
            Self::TokenNotFound => ErrorCategory::Token,
            Self::TokenRevoked => ErrorCategory::Token,
            Self::TokenExpired => ErrorCategory::Token,
            Self::InvalidSignature => ErrorCategory::Token,
            Self::MalformedToken { .. } => ErrorCategory::Token,
            Self::RateLimited => ErrorCategory::RateLimit,
            Self::TransientStoreError { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code reported to callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "AUTH_ERR_INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "AUTH_ERR_ACCOUNT_LOCKED",
            Self::AccountDisabled => "AUTH_ERR_ACCOUNT_DISABLED",
            Self::EmailNotVerified => "AUTH_ERR_EMAIL_NOT_VERIFIED",
            Self::TokenNotFound => "AUTH_ERR_TOKEN_NOT_FOUND",
            Self::TokenRevoked => "AUTH_ERR_TOKEN_REVOKED",
            Self::TokenExpired => "AUTH_ERR_TOKEN_EXPIRED",
            Self::InvalidSignature => "AUTH_ERR_INVALID_SIGNATURE",
            Self::MalformedToken { .. } => "AUTH_ERR_MALFORMED_TOKEN",
            Self::RateLimited => "AUTH_ERR_RATE_LIMIT",
            Self::TransientStoreError { .. } => "AUTH_ERR_STORE_UNAVAILABLE",
            Self::Configuration { .. } => "AUTH_ERR_CONFIGURATION",
            Self::Internal { .. } => "AUTH_ERR_INTERNAL",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidCredentials
            | Self::TokenNotFound
            | Self::TokenRevoked
            | Self::TokenExpired
            | Self::InvalidSignature
            | Self::MalformedToken { .. } => 401,
            Self::AccountLocked { .. } => 423,
            Self::AccountDisabled | Self::EmailNotVerified => 403,
            Self::RateLimited => 429,
            Self::TransientStoreError { .. } => 503,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Login and account-state errors.
    Authentication,
    /// Access and refresh token errors.
    Token,
    /// Rate limiter rejections.
    RateLimit,
    /// Store or cache failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(AuthError::TokenExpired.to_string(), "Token expired");
        assert_eq!(
            AuthError::malformed_token("missing segment").to_string(),
            "Malformed token: missing segment"
        );
        assert_eq!(
            AuthError::transient("redis down").to_string(),
            "Store unavailable: redis down"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::InvalidCredentials.is_client_error());
        assert!(!AuthError::InvalidCredentials.is_server_error());

        assert!(AuthError::TokenRevoked.is_token_error());
        assert!(AuthError::InvalidSignature.is_token_error());
        assert!(!AuthError::account_locked(None).is_token_error());

        let err = AuthError::transient("timeout");
        assert!(err.is_server_error());
        assert!(err.is_transient());
        assert!(!AuthError::TokenExpired.is_transient());
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            AuthError::InvalidCredentials,
            AuthError::account_locked(None),
            AuthError::AccountDisabled,
            AuthError::EmailNotVerified,
            AuthError::TokenNotFound,
            AuthError::TokenRevoked,
            AuthError::TokenExpired,
            AuthError::InvalidSignature,
            AuthError::malformed_token("x"),
            AuthError::RateLimited,
            AuthError::transient("x"),
            AuthError::configuration("x"),
            AuthError::internal("x"),
        ];

        let mut codes: Vec<&str> = errors.iter().map(AuthError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(AuthError::RateLimited.code(), "AUTH_ERR_RATE_LIMIT");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(AuthError::InvalidCredentials.http_status(), 401);
        assert_eq!(AuthError::account_locked(None).http_status(), 423);
        assert_eq!(AuthError::AccountDisabled.http_status(), 403);
        assert_eq!(AuthError::RateLimited.http_status(), 429);
        assert_eq!(AuthError::transient("x").http_status(), 503);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::InvalidCredentials.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(AuthError::TokenRevoked.category(), ErrorCategory::Token);
        assert_eq!(AuthError::RateLimited.category(), ErrorCategory::RateLimit);
        assert_eq!(
            AuthError::transient("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
    }
}
