//! Integration tests for the in-memory User repository.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::{Duration, Utc};
use unimarket_core::error::MarketError;
use unimarket_core::models::user::{CreateUser, EmailCode, UpdateUser, UserRole};
use unimarket_core::repository::UserRepository;
use unimarket_store::repository::InMemoryUserRepository;
use unimarket_store::{DEMO_USERS, seed_demo_users};

fn new_user(email: &str, password: &str) -> CreateUser {
    CreateUser {
        name: "Alice".into(),
        email: email.into(),
        password: password.into(),
        role: UserRole::Student,
        is_verified: false,
        verification_token: Some("verify-me".into()),
    }
}

fn password_matches(password: &str, hash: &str) -> bool {
    let parsed = PasswordHash::new(hash).unwrap();
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[tokio::test]
async fn create_and_get_user() {
    let repo = InMemoryUserRepository::new();

    let user = repo
        .create(new_user("alice@example.com", "SuperSecret123!"))
        .await
        .unwrap();

    assert_eq!(user.email, "alice@example.com");
    assert!(!user.is_verified);
    assert!(!user.two_factor_enabled);
    assert!(user.email_code.is_none());

    // Password should be hashed, not stored in plaintext.
    assert_ne!(user.password_hash, "SuperSecret123!");
    assert!(user.password_hash.starts_with("$argon2id$"));
    assert!(password_matches("SuperSecret123!", &user.password_hash));

    let by_id = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(by_id.email, user.email);
    let by_email = repo.get_by_email("alice@example.com").await.unwrap();
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
async fn duplicate_email_rejected() {
    let repo = InMemoryUserRepository::new();
    repo.create(new_user("alice@example.com", "pw"))
        .await
        .unwrap();

    let err = repo
        .create(new_user("alice@example.com", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::AlreadyExists { .. }));
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn email_lookup_is_case_sensitive() {
    let repo = InMemoryUserRepository::new();
    repo.create(new_user("alice@example.com", "pw"))
        .await
        .unwrap();

    let err = repo.get_by_email("Alice@example.com").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn lookup_by_verification_token() {
    let repo = InMemoryUserRepository::new();
    let user = repo
        .create(new_user("alice@example.com", "pw"))
        .await
        .unwrap();

    let found = repo.get_by_verification_token("verify-me").await.unwrap();
    assert_eq!(found.id, user.id);
    assert!(repo.get_by_verification_token("nope").await.is_err());
}

#[tokio::test]
async fn update_rehashes_password_and_clears_fields() {
    let repo = InMemoryUserRepository::new();
    let user = repo
        .create(new_user("alice@example.com", "OldPass1!"))
        .await
        .unwrap();

    let updated = repo
        .update(
            user.id,
            UpdateUser {
                password: Some("NewPass2@".into()),
                is_verified: Some(true),
                verification_token: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(updated.is_verified);
    assert!(updated.verification_token.is_none());
    assert!(password_matches("NewPass2@", &updated.password_hash));
    assert!(!password_matches("OldPass1!", &updated.password_hash));
    assert!(updated.updated_at >= user.updated_at);
}

#[tokio::test]
async fn update_unknown_user_is_not_found() {
    let repo = InMemoryUserRepository::new();
    let err = repo
        .update(uuid::Uuid::new_v4(), UpdateUser::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn email_code_is_taken_once() {
    let repo = InMemoryUserRepository::new();
    let user = repo
        .create(new_user("alice@example.com", "pw"))
        .await
        .unwrap();

    repo.update(
        user.id,
        UpdateUser {
            email_code: Some(Some(EmailCode {
                code: "123456".into(),
                expires_at: Utc::now() + Duration::minutes(10),
            })),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(!repo.take_email_code(user.id, "654321").await.unwrap());
    assert!(repo.take_email_code(user.id, "123456").await.unwrap());
    assert!(!repo.take_email_code(user.id, "123456").await.unwrap());
    assert!(repo.get_by_id(user.id).await.unwrap().email_code.is_none());
}

#[tokio::test]
async fn seed_is_idempotent() {
    let repo = InMemoryUserRepository::new();

    let first = seed_demo_users(&repo).await.unwrap();
    assert_eq!(first.len(), DEMO_USERS.len());

    let second = seed_demo_users(&repo).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(repo.len(), DEMO_USERS.len());

    let john = repo.get_by_email("john@example.com").await.unwrap();
    assert!(john.is_verified);
    assert!(password_matches("password123", &john.password_hash));
}
