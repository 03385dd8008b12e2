//! UniMarket Core: domain models, error types and repository traits
//! shared by the store, auth and server crates.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{MarketError, MarketResult};
