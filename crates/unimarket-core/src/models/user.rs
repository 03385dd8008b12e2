//! User (identity) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending emailed login code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl EmailCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Lookup key, compared exactly as stored.
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub two_factor_enabled: bool,
    /// AES-256-GCM encrypted TOTP secret (if enrolled).
    pub two_factor_secret: Option<String>,
    pub email_code: Option<EmailCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// True when a confirmed TOTP secret is on file.
    pub fn has_totp(&self) -> bool {
        self.two_factor_enabled && self.two_factor_secret.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub role: UserRole,
    pub is_verified: bool,
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    /// Raw replacement password (hashed before storage).
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub is_verified: Option<bool>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub verification_token: Option<Option<String>>,
    pub two_factor_enabled: Option<bool>,
    pub two_factor_secret: Option<Option<String>>,
    pub email_code: Option<Option<EmailCode>>,
}
