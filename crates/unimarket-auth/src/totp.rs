//! Authenticator-app codes (RFC 6238) and at-rest protection of their
//! shared secrets.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

const DIGITS: usize = 6;
/// One step of drift either way.
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;
const NONCE_LEN: usize = 12;

fn cipher(key: &[u8; 32]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
}

/// Seal a secret under `key`. The stored form is base64 of the random
/// nonce followed by the GCM output.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher(key)
        .encrypt(&nonce, plaintext)
        .map_err(|_| AuthError::Crypto("could not seal TOTP secret".into()))?;

    let mut stored = Vec::with_capacity(NONCE_LEN + sealed.len());
    stored.extend_from_slice(nonce.as_slice());
    stored.extend(sealed);
    Ok(STANDARD.encode(stored))
}

/// Reverse of [`encrypt_secret`]. Fails on a wrong key, tampering, or
/// input too short to hold a nonce and a tag.
pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let stored = STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::Crypto("stored TOTP secret is not base64".into()))?;
    if stored.len() <= NONCE_LEN {
        return Err(AuthError::Crypto("stored TOTP secret is truncated".into()));
    }

    let (nonce, sealed) = stored.split_at(NONCE_LEN);
    cipher(key)
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| AuthError::Crypto("could not open TOTP secret".into()))
}

/// A new secret waiting for the user to prove their app has it.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    pub secret_bytes: Vec<u8>,
    pub secret_base32: String,
    pub otpauth_uri: String,
}

fn authenticator(secret: &[u8], issuer: &str, account: &str) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        secret.to_vec(),
        Some(issuer.to_owned()),
        account.to_owned(),
    )
    .map_err(|e| AuthError::Crypto(format!("unusable TOTP secret: {e}")))
}

pub fn generate_enrollment(issuer: &str, account: &str) -> Result<TotpEnrollment, AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("unusable TOTP secret: {e}")))?;
    let otpauth_uri = authenticator(&secret_bytes, issuer, account)?.get_url();

    Ok(TotpEnrollment {
        secret_base32: secret.to_encoded().to_string(),
        secret_bytes,
        otpauth_uri,
    })
}

/// Check `code` against the wall clock.
pub fn verify_code(
    secret_bytes: &[u8],
    code: &str,
    issuer: &str,
    account: &str,
) -> Result<bool, AuthError> {
    authenticator(secret_bytes, issuer, account)?
        .check_current(code)
        .map_err(|e| AuthError::Crypto(format!("system clock: {e}")))
}

/// Check `code` as of `unix_secs`.
pub fn verify_code_at(
    secret_bytes: &[u8],
    code: &str,
    unix_secs: u64,
    issuer: &str,
    account: &str,
) -> Result<bool, AuthError> {
    Ok(authenticator(secret_bytes, issuer, account)?.check(code, unix_secs))
}
