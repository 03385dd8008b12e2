//! Domain models for UniMarket authentication.
//!
//! These are the core types shared across all crates.

pub mod rate_limit;
pub mod security_event;
pub mod session;
pub mod user;
