//! Authentication error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use unimarket_core::error::MarketError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identifier and secret are required")]
    MissingCredentials,

    #[error("too many attempts, locked until {locked_until}")]
    RateLimited { locked_until: DateTime<Utc> },

    #[error("no user with that identifier")]
    UserNotFound,

    #[error("invalid password")]
    InvalidPassword,

    #[error("second factor is required")]
    SecondFactorRequired,

    #[error("invalid second factor code")]
    InvalidSecondFactor,

    #[error("session not found")]
    SessionNotFound,

    #[error("TOTP is not enrolled for this user")]
    TotpNotEnrolled,

    #[error("TOTP enrollment is disabled")]
    TotpUnavailable,

    #[error("TOTP is already enabled; disable it before enrolling again")]
    TotpAlreadyEnabled,

    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid verification token")]
    InvalidVerificationToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(#[from] MarketError),
}

impl AuthError {
    /// Message safe to show to the caller.
    ///
    /// Unknown users and wrong passwords read the same so the response
    /// cannot be used to enumerate accounts. Faults collapse into one
    /// generic server error.
    pub fn public_message(&self) -> String {
        match self {
            Self::UserNotFound | Self::InvalidPassword => "invalid credentials".into(),
            Self::Crypto(_) | Self::Storage(_) => "an internal error occurred".into(),
            other => other.to_string(),
        }
    }

    /// Faults that are not the caller's doing.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Crypto(_) | Self::Storage(_))
    }
}

impl From<AuthError> for MarketError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Storage(inner) => inner,
            AuthError::Crypto(msg) => MarketError::Crypto(msg),
            AuthError::RateLimited { .. } => MarketError::RateLimited,
            AuthError::WeakPassword(_) | AuthError::MissingField(_) => MarketError::Validation {
                message: err.to_string(),
            },
            AuthError::EmailTaken => MarketError::AlreadyExists {
                entity: "user".into(),
            },
            other => MarketError::AuthenticationFailed {
                reason: other.public_message(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_and_bad_password_look_alike() {
        assert_eq!(
            AuthError::UserNotFound.public_message(),
            AuthError::InvalidPassword.public_message()
        );
    }

    #[test]
    fn storage_faults_are_generic() {
        let err = AuthError::Storage(MarketError::Storage("disk on fire".into()));
        assert!(err.is_internal());
        assert!(!err.public_message().contains("disk"));
    }

    #[test]
    fn converts_to_authentication_failed() {
        let err: MarketError = AuthError::InvalidSecondFactor.into();
        assert!(matches!(err, MarketError::AuthenticationFailed { .. }));

        let err: MarketError = AuthError::RateLimited {
            locked_until: Utc::now(),
        }
        .into();
        assert!(matches!(err, MarketError::RateLimited));
    }
}
