//! Server and HTTP error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use unimarket_auth::AuthError;
use unimarket_core::MarketError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Market(#[from] MarketError),
}

/// An [`AuthError`] rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AuthError::MissingCredentials
            | AuthError::MissingField(_)
            | AuthError::WeakPassword(_)
            | AuthError::InvalidVerificationToken => StatusCode::BAD_REQUEST,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::UserNotFound
            | AuthError::InvalidPassword
            | AuthError::SecondFactorRequired
            | AuthError::InvalidSecondFactor
            | AuthError::SessionNotFound
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::TotpNotEnrolled | AuthError::TotpAlreadyEnabled => StatusCode::CONFLICT,
            AuthError::TotpUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Crypto(_) | AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_internal() {
            error!(error = %self.0, "request failed");
        }
        let status = self.status();
        let mut body = json!({ "error": self.0.public_message() });
        match &self.0 {
            AuthError::RateLimited { locked_until } => {
                body["lockedUntil"] = json!(locked_until.to_rfc3339());
            }
            AuthError::SecondFactorRequired => {
                body["secondFactorRequired"] = json!(true);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}
