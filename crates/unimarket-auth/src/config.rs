//! Knobs for the authentication core. The server fills these from the
//! environment; tests build them directly.

use chrono::Duration;
use unimarket_core::models::rate_limit::RateLimitPolicy;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for session token signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for session token verification.
    pub jwt_public_key_pem: String,
    /// Session token lifetime in seconds (default: 86_400 = 1 day).
    pub token_lifetime_secs: u64,
    /// Expected and emitted `iss`.
    pub jwt_issuer: String,
    /// Idle time after which a session is no longer live
    /// (default: 2_592_000 = 30 days).
    pub session_ttl_secs: u64,
    /// Server-side secret mixed into every password hash.
    pub pepper: Option<String>,
    pub min_password_length: usize,
    /// Key sealing stored TOTP secrets. Without it TOTP cannot be
    /// enrolled or checked.
    pub mfa_encryption_key: Option<[u8; 32]>,
    /// Label shown in authenticator apps.
    pub totp_issuer: String,
    /// Validity of an emailed login code in seconds (default: 600).
    pub email_code_lifetime_secs: u64,
    /// Limit applied per client IP.
    pub ip_rate_limit: RateLimitPolicy,
    /// Limit applied per identity (email).
    pub identity_rate_limit: RateLimitPolicy,
}

/// Upper bound for every configured lifetime (ten years). Longer values
/// are clamped here and rejected by the server's config loader.
pub const MAX_LIFETIME_SECS: u64 = 10 * 365 * 86_400;

fn lifetime(secs: u64) -> Duration {
    let secs = i64::try_from(secs.min(MAX_LIFETIME_SECS)).unwrap_or(i64::MAX);
    Duration::try_seconds(secs).unwrap_or(Duration::MAX)
}

impl AuthConfig {
    pub fn session_ttl(&self) -> Duration {
        lifetime(self.session_ttl_secs)
    }

    pub fn email_code_lifetime(&self) -> Duration {
        lifetime(self.email_code_lifetime_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            token_lifetime_secs: 86_400,
            jwt_issuer: "unimarket".into(),
            session_ttl_secs: 2_592_000,
            pepper: None,
            min_password_length: 8,
            mfa_encryption_key: None,
            totp_issuer: "UniMarket".into(),
            email_code_lifetime_secs: 600,
            ip_rate_limit: RateLimitPolicy::new(
                Duration::minutes(15),
                20,
                Duration::minutes(30),
            ),
            identity_rate_limit: RateLimitPolicy::new(
                Duration::minutes(15),
                5,
                Duration::minutes(30),
            ),
        }
    }
}
