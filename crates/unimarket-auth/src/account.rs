//! Account lifecycle: signup, email verification, password change and
//! two-factor management.

use tracing::info;
use unimarket_core::models::security_event::{EventContext, SecurityEventKind};
use unimarket_core::models::user::{CreateUser, UpdateUser, User, UserRole};
use unimarket_core::repository::{
    RateLimitRepository, SecurityEventRepository, SessionRepository, UserRepository,
};
use unimarket_core::MarketError;
use uuid::Uuid;

use crate::error::AuthError;
use crate::service::AuthService;
use crate::{password, token, totp};

#[derive(Debug, Clone, Default)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Secret material handed to the user while enrolling TOTP.
#[derive(Debug, Clone)]
pub struct TotpSetup {
    /// Base32 secret for manual entry.
    pub secret: String,
    pub otpauth_uri: String,
}

impl<U, S, L, E> AuthService<U, S, L, E>
where
    U: UserRepository,
    S: SessionRepository,
    L: RateLimitRepository,
    E: SecurityEventRepository,
{
    /// Register a new, unverified student account and send its
    /// verification token.
    pub async fn signup(&self, input: SignupInput) -> Result<User, AuthError> {
        let name = input.name.trim();
        let email = input.email.trim();
        if name.is_empty() {
            return Err(AuthError::MissingField("name"));
        }
        if email.is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if input.password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        password::check_strength(&input.password, self.config.min_password_length)?;

        let verification_token = token::generate_opaque_token();
        let user = self
            .users
            .create(CreateUser {
                name: name.to_string(),
                email: email.to_string(),
                password: input.password,
                role: UserRole::Student,
                is_verified: false,
                verification_token: Some(verification_token.clone()),
            })
            .await
            .map_err(|e| match e {
                MarketError::AlreadyExists { .. } => AuthError::EmailTaken,
                other => AuthError::Storage(other),
            })?;

        info!(user_id = %user.id, "user signed up");
        self.notifier.verification(&user.email, &verification_token);
        self.events
            .record(
                SecurityEventKind::UserSignup,
                EventContext::new()
                    .email(user.email.as_str())
                    .user(user.id, user.role),
            )
            .await;
        Ok(user)
    }

    /// Mark the owner of `token` as verified. Verifying twice is fine.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidVerificationToken);
        }
        let user = self
            .users
            .get_by_verification_token(token)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AuthError::InvalidVerificationToken
                } else {
                    AuthError::Storage(e)
                }
            })?;
        if user.is_verified {
            return Ok(user);
        }

        let user = self
            .users
            .update(
                user.id,
                UpdateUser {
                    is_verified: Some(true),
                    verification_token: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        self.events
            .record(
                SecurityEventKind::EmailVerified,
                EventContext::new()
                    .email(user.email.as_str())
                    .user(user.id, user.role),
            )
            .await;
        Ok(user)
    }

    /// Replace the password. Existing sessions stay valid; see
    /// [`AuthService::revoke_all_sessions`].
    pub async fn change_password(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), AuthError> {
        password::check_strength(new_password, self.config.min_password_length)?;
        let user = self
            .users
            .update(
                user_id,
                UpdateUser {
                    password: Some(new_password.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        self.events
            .record(
                SecurityEventKind::PasswordChange,
                EventContext::new()
                    .email(user.email.as_str())
                    .user(user.id, user.role),
            )
            .await;
        Ok(())
    }

    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<u64, AuthError> {
        Ok(self.sessions.revoke_user_sessions(user_id).await?)
    }

    /// Generate and store a TOTP secret. Login keeps ignoring it until
    /// [`AuthService::confirm_totp_enrollment`] succeeds.
    ///
    /// Refused while TOTP is active, so a bearer token alone cannot swap
    /// or switch off a working second factor.
    pub async fn begin_totp_enrollment(&self, user_id: Uuid) -> Result<TotpSetup, AuthError> {
        let key = self
            .config
            .mfa_encryption_key
            .ok_or(AuthError::TotpUnavailable)?;
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TotpAlreadyEnabled);
        }

        let enrollment = totp::generate_enrollment(&self.config.totp_issuer, &user.email)?;
        let encrypted = totp::encrypt_secret(&key, &enrollment.secret_bytes)?;
        self.users
            .update(
                user.id,
                UpdateUser {
                    two_factor_enabled: Some(false),
                    two_factor_secret: Some(Some(encrypted)),
                    ..Default::default()
                },
            )
            .await?;

        Ok(TotpSetup {
            secret: enrollment.secret_base32,
            otpauth_uri: enrollment.otpauth_uri,
        })
    }

    /// Turn TOTP on once the user proves their authenticator works.
    pub async fn confirm_totp_enrollment(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<(), AuthError> {
        let user = self.load_user(user_id).await?;
        let secret = self.verifier.totp_secret(&user)?;
        if !totp::verify_code(&secret, code.trim(), &self.config.totp_issuer, &user.email)? {
            return Err(AuthError::InvalidSecondFactor);
        }

        self.users
            .update(
                user.id,
                UpdateUser {
                    two_factor_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        self.events
            .record(
                SecurityEventKind::TwoFactorEnabled,
                EventContext::new()
                    .email(user.email.as_str())
                    .user(user.id, user.role),
            )
            .await;
        Ok(())
    }

    pub async fn disable_two_factor(&self, user_id: Uuid) -> Result<(), AuthError> {
        let user = self
            .users
            .update(
                user_id,
                UpdateUser {
                    two_factor_enabled: Some(false),
                    two_factor_secret: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        self.events
            .record(
                SecurityEventKind::TwoFactorDisabled,
                EventContext::new()
                    .email(user.email.as_str())
                    .user(user.id, user.role),
            )
            .await;
        Ok(())
    }
}
