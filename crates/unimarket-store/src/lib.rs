//! UniMarket Store: in-memory repository implementations.
//!
//! This crate provides:
//! - Repository implementations for every `unimarket-core` trait
//!   ([`repository`])
//! - Demo accounts for local runs ([`seed_demo_users`])
//! - Error types ([`StoreError`])
//!
//! Every repository is a cheap `Clone` handle over shared state, so a test
//! can keep one handle for inspection while the auth layer owns another.

mod error;
pub mod repository;
mod seed;

pub use error::StoreError;
pub use seed::{DEMO_USERS, DemoUser, seed_demo_users};
