//! Demo accounts for local development.

use tracing::info;
use unimarket_core::error::{MarketError, MarketResult};
use unimarket_core::models::user::{CreateUser, User, UserRole};
use unimarket_core::repository::UserRepository;

/// A seed account with its plaintext password.
#[derive(Debug, Clone)]
pub struct DemoUser {
    pub name: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub role: UserRole,
}

pub const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        name: "John Doe",
        email: "john@example.com",
        password: "password123",
        role: UserRole::Student,
    },
    DemoUser {
        name: "Jane Doe",
        email: "jane@example.com",
        password: "password456",
        role: UserRole::Admin,
    },
];

/// Insert the demo accounts (verified, no second factor).
///
/// Accounts that already exist are left untouched.
pub async fn seed_demo_users<U: UserRepository>(users: &U) -> MarketResult<Vec<User>> {
    let mut created = Vec::with_capacity(DEMO_USERS.len());
    for demo in DEMO_USERS {
        let result = users
            .create(CreateUser {
                name: demo.name.into(),
                email: demo.email.into(),
                password: demo.password.into(),
                role: demo.role,
                is_verified: true,
                verification_token: None,
            })
            .await;
        match result {
            Ok(user) => created.push(user),
            Err(MarketError::AlreadyExists { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    info!(count = created.len(), "seeded demo users");
    Ok(created)
}
