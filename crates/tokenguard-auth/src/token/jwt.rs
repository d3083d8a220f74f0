//! Access token encoding and verification.
//!
//! Access tokens are compact HS256 JWTs signed with a symmetric secret. They
//! are never stored: a token exists only as long as its signature verifies
//! and its `exp` claim is in the future.
//!
//! ## Verification order
//!
//! 1. Split off the signature segment and check HMAC-SHA256 over the signing
//!    input in constant time. Any altered byte, or a token signed with a
//!    different algorithm or key, fails here with [`JwtError::InvalidSignature`].
//! 2. Decode the header and claims, pinning the algorithm to HS256 and
//!    requiring `exp` with zero leeway.
//!
//! ## Example
//!
//! ```ignore
//! use tokenguard_auth::token::jwt::JwtService;
//!
//! let jwt = JwtService::from_config(&config.jwt);
//! let issued = jwt.issue(&credential.identity(), &credential.roles, config.jwt.access_token_ttl)?;
//! let claims = jwt.verify(&issued.token)?;
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::{JwtConfig, MIN_SECRET_LEN};
use crate::error::AuthError;
use crate::types::Identity;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during access token operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The token's `exp` claim is in the past.
    #[error("Token expired")]
    Expired,

    /// The signature does not match the signing input under this secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token or its claims could not be parsed.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of what could not be parsed.
        message: String,
    },

    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation error (expired, bad signature, unparsable).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, Self::Encoding { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            // A header naming another algorithm is never accepted.
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::InvalidSignature,
            _ => Self::malformed(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidSignature => AuthError::InvalidSignature,
            JwtError::Malformed { message } => AuthError::malformed_token(message),
            JwtError::Encoding { message } => AuthError::internal(message),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: the identity id.
    pub sub: String,

    /// Login name.
    pub preferred_username: String,

    /// Email address.
    pub email: String,

    /// Role names.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Issued at (unix seconds).
    pub iat: i64,

    /// Expiry (unix seconds).
    pub exp: i64,

    /// Unique token id, used as the denylist key when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Issuer, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl AccessTokenClaims {
    /// Builds claims for `identity` valid from `now` for `ttl`.
    #[must_use]
    pub fn new(identity: &Identity, roles: &[String], now: OffsetDateTime, ttl: Duration) -> Self {
        let exp = now + ttl;
        Self {
            sub: identity.id.to_string(),
            preferred_username: identity.username.clone(),
            email: identity.email.clone(),
            roles: roles.to_vec(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: None,
            iss: None,
        }
    }

    /// Sets a random `jti`.
    #[must_use]
    pub fn with_random_jti(mut self) -> Self {
        self.jti = Some(Uuid::new_v4().to_string());
        self
    }

    /// Sets the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }

    /// Returns the subject as an identity id, if it parses.
    #[must_use]
    pub fn identity_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Returns the expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.exp).ok()
    }

    /// Returns `true` if the token carries the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    /// Compact serialized JWT.
    pub token: String,

    /// When the token expires.
    pub expires_at: OffsetDateTime,

    /// Token id, if one was added.
    pub jti: Option<String>,
}

// ============================================================================
// JWT Service
// ============================================================================

/// Signs and verifies HS256 access tokens.
#[derive(Clone)]
pub struct JwtService {
    secret: Vec<u8>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
    include_jti: bool,
}

impl JwtService {
    /// Creates a service for `secret`.
    ///
    /// Secrets shorter than 32 bytes are accepted for non-production use but
    /// log a warning.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref().to_vec();
        if secret.len() < MIN_SECRET_LEN {
            tracing::warn!(
                secret_len = secret.len(),
                min_len = MIN_SECRET_LEN,
                "JWT signing secret is shorter than recommended"
            );
        }

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            secret,
            issuer: None,
            include_jti: true,
        }
    }

    /// Creates a service from configuration.
    #[must_use]
    pub fn from_config(config: &JwtConfig) -> Self {
        let mut service = Self::new(config.secret.as_bytes()).with_jti(config.include_jti);
        if let Some(issuer) = &config.issuer {
            service = service.with_issuer(issuer.clone());
        }
        service
    }

    /// Sets the issuer added on issue and required on verify.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Enables or disables the `jti` claim on issued tokens.
    #[must_use]
    pub fn with_jti(mut self, include_jti: bool) -> Self {
        self.include_jti = include_jti;
        self
    }

    /// Issues a signed token for `identity` valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Encoding` if the claims cannot be serialized.
    pub fn issue(
        &self,
        identity: &Identity,
        roles: &[String],
        ttl: Duration,
    ) -> Result<IssuedAccessToken, JwtError> {
        let now = OffsetDateTime::now_utc();
        let mut claims = AccessTokenClaims::new(identity, roles, now, ttl);
        if self.include_jti {
            claims = claims.with_random_jti();
        }
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer.clone());
        }

        let token = self.encode(&claims)?;
        Ok(IssuedAccessToken {
            token,
            expires_at: now + ttl,
            jti: claims.jti,
        })
    }

    /// Signs arbitrary access token claims.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Encoding` if encoding fails.
    pub fn encode(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding(e.to_string()))
    }

    /// Verifies a token and returns its claims.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the signature does not match, including any
    ///   token signed with another algorithm
    /// - `Expired` if `exp` is in the past
    /// - `Malformed` if the token cannot be parsed or `exp` is missing
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        self.verify_signature(token)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    fn verify_signature(&self, token: &str) -> Result<(), JwtError> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| JwtError::malformed("token has no signature segment"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| JwtError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| JwtError::malformed(e.to_string()))?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| JwtError::InvalidSignature)
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("include_jti", &self.include_jti)
            .finish()
    }
}
