//! Password hashing and verification.
//!
//! Argon2id with default parameters and a random salt per hash, stored as
//! PHC strings (`$argon2id$...`).

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::AuthResult;
use crate::error::AuthError;

/// Hash a password for storage.
///
/// # Errors
///
/// Returns `Internal` if hashing fails (rare).
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch.
///
/// # Errors
///
/// Returns `Internal` if the stored hash is not a valid PHC string.
pub fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::internal(format!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = assert_ok!(hash_password("correct horse battery staple"));
        assert!(hash.starts_with("$argon2id$"));

        assert!(assert_ok!(verify_password("correct horse battery staple", &hash)));
        assert!(!assert_ok!(verify_password("wrong", &hash)));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_stored_hash() {
        let err = assert_err!(verify_password("x", "not-a-phc-string"));
        assert!(matches!(err, AuthError::Internal { .. }));
    }
}
