//! Password checks: Argon2id verification and the strength policy
//! applied at signup and password change.

use std::borrow::Cow;
use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{Error as HashError, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

use crate::error::AuthError;

/// The pepper, when configured, is prepended to the password. Hashing in
/// the store must use the same rule.
fn peppered<'a>(password: &'a str, pepper: Option<&str>) -> Cow<'a, str> {
    match pepper {
        Some(p) => Cow::Owned(format!("{p}{password}")),
        None => Cow::Borrowed(password),
    }
}

/// Check `password` against a PHC-format Argon2 hash.
///
/// A mismatch is `Ok(false)`; a hash that cannot be parsed is a
/// `Crypto` error.
pub fn verify_password(
    password: &str,
    hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    let input = peppered(password, pepper);
    match Argon2::default().verify_password(input.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// Spend the same Argon2 work as a real verification and discard the
/// result. Used when the identity does not exist so response time does
/// not reveal it.
pub fn burn_verification(password: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY.get_or_init(|| {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(b"unimarket-dummy-password", &salt)
            .ok()
            .map(|h| h.to_string())
    });
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash, None);
    }
}

/// Enforce the password policy: minimum length, upper and lower case
/// letters, a digit and a non-alphanumeric character.
pub fn check_strength(password: &str, min_length: usize) -> Result<(), AuthError> {
    let weak = |msg: &str| Err(AuthError::WeakPassword(msg.to_string()));

    if password.chars().count() < min_length {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {min_length} characters long"
        )));
    }
    if !password.chars().any(char::is_uppercase) {
        return weak("password must contain at least one uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        return weak("password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return weak("password must contain at least one number");
    }
    if password.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return weak("password must contain at least one special character");
    }
    Ok(())
}
