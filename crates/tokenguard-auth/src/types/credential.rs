//! Credential record and the identity view derived from it.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The subject an access token is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identity id, used as the token subject.
    pub id: Uuid,

    /// Login name.
    pub username: String,

    /// Email address.
    pub email: String,
}

/// Durable credential record owned by the persistence layer.
///
/// The lockout fields (`failed_attempts`, `locked_until`) are mutated by
/// [`LockoutPolicy`](crate::lockout::LockoutPolicy); the password hash is
/// only written by registration and reset flows outside this crate.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Identity id.
    pub id: Uuid,

    /// Unique login name (case-insensitive).
    pub username: String,

    /// Unique email address (case-insensitive).
    pub email: String,

    /// Argon2 PHC string.
    pub password_hash: String,

    /// Disabled accounts cannot log in or refresh.
    pub enabled: bool,

    /// Whether the email address has been confirmed.
    pub email_verified: bool,

    /// Consecutive failed logins since the last success or lock.
    pub failed_attempts: u32,

    /// When set and in the future, all logins are rejected.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub locked_until: Option<OffsetDateTime>,

    /// Role names copied into access tokens.
    pub roles: Vec<String>,

    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the record was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Credential {
    /// Creates an enabled, verified credential with no lockout state.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            enabled: true,
            email_verified: true,
            failed_attempts: 0,
            locked_until: None,
            roles,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the lock is set and has not elapsed at `now`.
    #[must_use]
    pub fn is_locked_at(&self, now: OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Returns `true` if the account is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.is_locked_at(OffsetDateTime::now_utc())
    }

    /// Returns the identity view used as access token subject.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    /// Returns `true` if `login` names this credential by username or email.
    #[must_use]
    pub fn matches_login(&self, login: &str) -> bool {
        self.username.eq_ignore_ascii_case(login) || self.email.eq_ignore_ascii_case(login)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("enabled", &self.enabled)
            .field("email_verified", &self.email_verified)
            .field("failed_attempts", &self.failed_attempts)
            .field("locked_until", &self.locked_until)
            .field("roles", &self.roles)
            .finish()
    }
}
