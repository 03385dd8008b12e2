//! Store-specific error types and conversions.

use unimarket_core::error::MarketError;

/// Store-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: String, key: String },
}

impl From<StoreError> for MarketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => MarketError::NotFound { entity, id },
            StoreError::Duplicate { entity, .. } => MarketError::AlreadyExists { entity },
            other => MarketError::Storage(other.to_string()),
        }
    }
}
