//! In-memory implementation of [`UserRepository`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1). Salt is randomly
//! generated per hash. An optional pepper (server-side secret) can be
//! provided at construction time.

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use unimarket_core::error::MarketResult;
use unimarket_core::models::user::{CreateUser, UpdateUser, User};
use unimarket_core::repository::UserRepository;
use uuid::Uuid;

use crate::error::StoreError;

/// Hash a password with Argon2id using OWASP-recommended parameters.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing. The salt is randomly generated for each call.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, StoreError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| StoreError::PasswordHash(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| StoreError::PasswordHash(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

#[derive(Default)]
struct UserTable {
    users: DashMap<Uuid, User>,
    /// email -> id. Always locked before `users` when both are needed.
    emails: DashMap<String, Uuid>,
}

/// In-memory implementation of the User repository.
#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    table: Arc<UserTable>,
    /// Optional server-side pepper for password hashing.
    pepper: Option<String>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pepper(pepper: String) -> Self {
        Self {
            table: Arc::default(),
            pepper: Some(pepper),
        }
    }

    pub fn len(&self) -> usize {
        self.table.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.users.is_empty()
    }
}

fn not_found(id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity: "user".into(),
        id: id.to_string(),
    }
}

impl UserRepository for InMemoryUserRepository {
    async fn create(&self, input: CreateUser) -> MarketResult<User> {
        // Hash before taking any lock; Argon2 is deliberately slow.
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;

        let slot = match self.table.emails.entry(input.email.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate {
                    entity: "user".into(),
                    key: input.email,
                }
                .into());
            }
            Entry::Vacant(slot) => slot,
        };

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            password_hash,
            role: input.role,
            is_verified: input.is_verified,
            verification_token: input.verification_token,
            two_factor_enabled: false,
            two_factor_secret: None,
            email_code: None,
            created_at: now,
            updated_at: now,
        };
        self.table.users.insert(user.id, user.clone());
        slot.insert(user.id);

        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> MarketResult<User> {
        self.table
            .users
            .get(&id)
            .map(|u| u.clone())
            .ok_or_else(|| not_found(id).into())
    }

    async fn get_by_email(&self, email: &str) -> MarketResult<User> {
        let id = self
            .table
            .emails
            .get(email)
            .map(|r| *r)
            .ok_or_else(|| not_found(email))?;
        self.get_by_id(id).await
    }

    async fn get_by_verification_token(&self, token: &str) -> MarketResult<User> {
        self.table
            .users
            .iter()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .map(|u| u.clone())
            .ok_or_else(|| not_found("verification token").into())
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> MarketResult<User> {
        let password_hash = match input.password.as_deref() {
            Some(p) => Some(hash_password(p, self.pepper.as_deref())?),
            None => None,
        };

        let mut user = self.table.users.get_mut(&id).ok_or_else(|| not_found(id))?;
        if let Some(name) = input.name {
            user.name = name;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        if let Some(role) = input.role {
            user.role = role;
        }
        if let Some(verified) = input.is_verified {
            user.is_verified = verified;
        }
        if let Some(token) = input.verification_token {
            user.verification_token = token;
        }
        if let Some(enabled) = input.two_factor_enabled {
            user.two_factor_enabled = enabled;
        }
        if let Some(secret) = input.two_factor_secret {
            user.two_factor_secret = secret;
        }
        if let Some(code) = input.email_code {
            user.email_code = code;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn take_email_code(&self, id: Uuid, code: &str) -> MarketResult<bool> {
        let mut user = self.table.users.get_mut(&id).ok_or_else(|| not_found(id))?;
        let matches = user.email_code.as_ref().is_some_and(|c| c.code == code);
        if matches {
            user.email_code = None;
            user.updated_at = Utc::now();
        }
        Ok(matches)
    }
}
