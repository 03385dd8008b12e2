//! Security event domain model (append-only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    LoginSuccess,
    LoginAttemptMissingCredentials,
    LoginAttemptUserNotFound,
    LoginAttemptInvalidPassword,
    LoginAttemptSecondFactorRequired,
    LoginAttemptInvalidSecondFactor,
    RateLimitExceeded,
    /// Storage or crypto fault while authenticating.
    LoginError,
    UserSignin,
    UserSignout,
    UserSignup,
    EmailVerified,
    PasswordChange,
    TwoFactorEnabled,
    TwoFactorDisabled,
    EmailCodeIssued,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginAttemptMissingCredentials => "LOGIN_ATTEMPT_MISSING_CREDENTIALS",
            Self::LoginAttemptUserNotFound => "LOGIN_ATTEMPT_USER_NOT_FOUND",
            Self::LoginAttemptInvalidPassword => "LOGIN_ATTEMPT_INVALID_PASSWORD",
            Self::LoginAttemptSecondFactorRequired => "LOGIN_ATTEMPT_SECOND_FACTOR_REQUIRED",
            Self::LoginAttemptInvalidSecondFactor => "LOGIN_ATTEMPT_INVALID_SECOND_FACTOR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::LoginError => "LOGIN_ERROR",
            Self::UserSignin => "USER_SIGNIN",
            Self::UserSignout => "USER_SIGNOUT",
            Self::UserSignup => "USER_SIGNUP",
            Self::EmailVerified => "EMAIL_VERIFIED",
            Self::PasswordChange => "PASSWORD_CHANGE",
            Self::TwoFactorEnabled => "TWO_FACTOR_ENABLED",
            Self::TwoFactorDisabled => "TWO_FACTOR_DISABLED",
            Self::EmailCodeIssued => "EMAIL_CODE_ISSUED",
        }
    }

    /// Failed or refused authentication attempts.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::LoginAttemptMissingCredentials
                | Self::LoginAttemptUserNotFound
                | Self::LoginAttemptInvalidPassword
                | Self::LoginAttemptSecondFactorRequired
                | Self::LoginAttemptInvalidSecondFactor
                | Self::RateLimitExceeded
                | Self::LoginError
        )
    }
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contextual fields attached to an event. Absent fields are omitted
/// when serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self
    }

    pub fn user(mut self, user_id: Uuid, role: UserRole) -> Self {
        self.user_id = Some(user_id);
        self.role = Some(role);
        self
    }

    pub fn user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn lockout_minutes(mut self, minutes: i64) -> Self {
        self.lockout_minutes = Some(minutes);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub context: EventContext,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecurityEvent {
    pub kind: SecurityEventKind,
    pub context: EventContext,
}
