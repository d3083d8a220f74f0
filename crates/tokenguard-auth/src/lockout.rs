//! Account lockout policy.
//!
//! Pure decision logic over a [`Credential`]: callers persist the mutated
//! record afterwards. A lock, once set, blocks every login until it elapses,
//! whatever the failed counter says.

use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::LockoutConfig;
use crate::error::AuthError;
use crate::types::Credential;

/// Outcome of recording a failed password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The failure was counted; the account is still usable.
    Counted {
        /// Consecutive failures so far.
        failed_attempts: u32,
    },
    /// This failure reached the threshold and locked the account.
    Locked {
        /// When the lock elapses.
        until: OffsetDateTime,
    },
}

impl FailureOutcome {
    /// The error reported to the caller for this outcome.
    #[must_use]
    pub fn into_error(self) -> AuthError {
        match self {
            Self::Counted { .. } => AuthError::InvalidCredentials,
            Self::Locked { until } => AuthError::account_locked(Some(until)),
        }
    }
}

/// Lockout thresholds.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    max_failed_attempts: u32,
    lockout_duration: Duration,
}

impl LockoutPolicy {
    /// Creates a policy locking for `lockout_duration` after
    /// `max_failed_attempts` consecutive failures.
    #[must_use]
    pub fn new(max_failed_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_failed_attempts: max_failed_attempts.max(1),
            lockout_duration,
        }
    }

    /// Creates a policy from configuration.
    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        Self::new(config.max_failed_attempts, config.lockout_duration)
    }

    /// Rejects a login attempt on a locked account before any password check.
    ///
    /// # Errors
    ///
    /// Returns `AccountLocked` if the lock is set and has not elapsed.
    pub fn check(&self, credential: &Credential, now: OffsetDateTime) -> AuthResult<()> {
        if credential.is_locked_at(now) {
            return Err(AuthError::account_locked(credential.locked_until));
        }
        Ok(())
    }

    /// Counts a failed password check, locking when the threshold is reached.
    ///
    /// Locking resets the counter to zero.
    pub fn record_failure(&self, credential: &mut Credential, now: OffsetDateTime) -> FailureOutcome {
        let failed = credential.failed_attempts.saturating_add(1);

        if failed >= self.max_failed_attempts {
            let until = now + self.lockout_duration;
            credential.locked_until = Some(until);
            credential.failed_attempts = 0;
            tracing::warn!(
                identity_id = %credential.id,
                locked_until = %until,
                "account locked after repeated failed logins"
            );
            return FailureOutcome::Locked { until };
        }

        credential.failed_attempts = failed;
        tracing::debug!(identity_id = %credential.id, failed_attempts = failed, "failed login counted");
        FailureOutcome::Counted {
            failed_attempts: failed,
        }
    }

    /// Clears lockout state after a successful login.
    ///
    /// Returns `true` if the record changed and needs persisting.
    pub fn record_success(&self, credential: &mut Credential) -> bool {
        if credential.failed_attempts == 0 && credential.locked_until.is_none() {
            return false;
        }
        credential.failed_attempts = 0;
        credential.locked_until = None;
        true
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from_config(&LockoutConfig::default())
    }
}
