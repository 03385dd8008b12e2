//! Password and second-factor checks for a known identity.

use chrono::{DateTime, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;
use tracing::debug;
use unimarket_core::models::user::User;
use unimarket_core::repository::UserRepository;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::{password, totp};

/// Result of checking the second factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFactorOutcome {
    Valid,
    Invalid,
    /// A second factor applies but no code was submitted.
    Required,
    /// The identity has no second factor; skip the step.
    NotConfigured,
}

/// Generate a six digit login code.
pub fn generate_email_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

pub struct CredentialVerifier {
    pepper: Option<String>,
    mfa_encryption_key: Option<[u8; 32]>,
    totp_issuer: String,
}

impl CredentialVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            pepper: config.pepper.clone(),
            mfa_encryption_key: config.mfa_encryption_key,
            totp_issuer: config.totp_issuer.clone(),
        }
    }

    pub fn verify_password(&self, plaintext: &str, user: &User) -> Result<bool, AuthError> {
        password::verify_password(plaintext, &user.password_hash, self.pepper.as_deref())
    }

    /// Decrypt the stored TOTP secret of `user`.
    pub fn totp_secret(&self, user: &User) -> Result<Vec<u8>, AuthError> {
        let encrypted = user
            .two_factor_secret
            .as_deref()
            .ok_or(AuthError::TotpNotEnrolled)?;
        let key = self
            .mfa_encryption_key
            .as_ref()
            .ok_or(AuthError::TotpUnavailable)?;
        totp::decrypt_secret(key, encrypted)
    }

    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    pub async fn verify_second_factor<U: UserRepository>(
        &self,
        users: &U,
        user: &User,
        submitted: Option<&str>,
    ) -> Result<SecondFactorOutcome, AuthError> {
        self.verify_second_factor_at(users, user, submitted, Utc::now())
            .await
    }

    /// Check the applicable second factor at `now`.
    ///
    /// TOTP wins over a pending emailed code. A valid emailed code is
    /// consumed atomically, so it is accepted at most once.
    pub async fn verify_second_factor_at<U: UserRepository>(
        &self,
        users: &U,
        user: &User,
        submitted: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SecondFactorOutcome, AuthError> {
        let submitted = submitted.map(str::trim).filter(|c| !c.is_empty());

        if user.has_totp() {
            let Some(code) = submitted else {
                return Ok(SecondFactorOutcome::Required);
            };
            let secret = self.totp_secret(user)?;
            let unix_secs = u64::try_from(now.timestamp()).unwrap_or_default();
            let valid =
                totp::verify_code_at(&secret, code, unix_secs, &self.totp_issuer, &user.email)?;
            return Ok(if valid {
                SecondFactorOutcome::Valid
            } else {
                SecondFactorOutcome::Invalid
            });
        }

        let Some(pending) = user.email_code.as_ref() else {
            return Ok(SecondFactorOutcome::NotConfigured);
        };
        let Some(code) = submitted else {
            return Ok(SecondFactorOutcome::Required);
        };

        let matches: bool = pending.code.as_bytes().ct_eq(code.as_bytes()).into();
        if !matches || pending.is_expired_at(now) {
            debug!(user_id = %user.id, expired = pending.is_expired_at(now), "email code rejected");
            return Ok(SecondFactorOutcome::Invalid);
        }

        // Another request may have consumed the same code in the meantime.
        if users.take_email_code(user.id, &pending.code).await? {
            Ok(SecondFactorOutcome::Valid)
        } else {
            Ok(SecondFactorOutcome::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use unimarket_core::models::user::{CreateUser, EmailCode, UpdateUser, UserRole};
    use unimarket_store::repository::InMemoryUserRepository;

    use super::*;

    async fn user_with_code(
        repo: &InMemoryUserRepository,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> User {
        let user = repo
            .create(CreateUser {
                name: "Sam".into(),
                email: "sam@campus.edu".into(),
                password: "Campus#2024".into(),
                role: UserRole::Student,
                is_verified: true,
                verification_token: None,
            })
            .await
            .unwrap();
        repo.update(
            user.id,
            UpdateUser {
                email_code: Some(Some(EmailCode {
                    code: code.into(),
                    expires_at,
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn email_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_email_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn no_second_factor_is_not_configured() {
        let repo = InMemoryUserRepository::new();
        let user = user_with_code(&repo, "123456", Utc::now()).await;
        let user = User {
            email_code: None,
            ..user
        };
        let verifier = CredentialVerifier::new(&AuthConfig::default());

        let outcome = verifier
            .verify_second_factor(&repo, &user, Some("123456"))
            .await
            .unwrap();
        assert_eq!(outcome, SecondFactorOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn email_code_is_single_use() {
        let repo = InMemoryUserRepository::new();
        let now = Utc::now();
        let user = user_with_code(&repo, "482913", now + Duration::minutes(10)).await;
        let verifier = CredentialVerifier::new(&AuthConfig::default());

        assert_eq!(
            verifier
                .verify_second_factor_at(&repo, &user, None, now)
                .await
                .unwrap(),
            SecondFactorOutcome::Required
        );
        assert_eq!(
            verifier
                .verify_second_factor_at(&repo, &user, Some("482913"), now)
                .await
                .unwrap(),
            SecondFactorOutcome::Valid
        );

        // The stale snapshot still carries the code; the store does not.
        assert_eq!(
            verifier
                .verify_second_factor_at(&repo, &user, Some("482913"), now)
                .await
                .unwrap(),
            SecondFactorOutcome::Invalid
        );
        assert!(repo.get_by_id(user.id).await.unwrap().email_code.is_none());
    }

    #[tokio::test]
    async fn expired_or_wrong_email_code_is_invalid() {
        let repo = InMemoryUserRepository::new();
        let now = Utc::now();
        let user = user_with_code(&repo, "111222", now).await;
        let verifier = CredentialVerifier::new(&AuthConfig::default());

        let wrong = verifier
            .verify_second_factor_at(&repo, &user, Some("999999"), now)
            .await
            .unwrap();
        assert_eq!(wrong, SecondFactorOutcome::Invalid);

        let late = verifier
            .verify_second_factor_at(&repo, &user, Some("111222"), now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(late, SecondFactorOutcome::Invalid);

        // Expiry is inclusive.
        let on_time = verifier
            .verify_second_factor_at(&repo, &user, Some("111222"), now)
            .await
            .unwrap();
        assert_eq!(on_time, SecondFactorOutcome::Valid);
    }
}
